//! Status line observer.

use super::UiUpdate;
use crate::observer::{MicStatus, MuteObserver, ObserverError};
use std::sync::mpsc::Sender;

/// Renders "Status: ..." for the tray menu's status line.
pub struct StatusLabelObserver {
    updates: Sender<UiUpdate>,
}

impl StatusLabelObserver {
    pub fn new(updates: Sender<UiUpdate>) -> Self {
        Self { updates }
    }

    pub fn text(status: MicStatus) -> String {
        format!("Status: {status}")
    }
}

impl MuteObserver for StatusLabelObserver {
    fn name(&self) -> &str {
        "status-label"
    }

    fn on_status(&mut self, status: MicStatus) -> Result<(), ObserverError> {
        self.updates
            .send(UiUpdate::Status(Self::text(status)))
            .map_err(|_| ObserverError::Disconnected {
                observer: self.name().to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn forwards_rendered_text() {
        let (tx, rx) = channel();
        let mut label = StatusLabelObserver::new(tx);

        label.on_status(MicStatus::Muted).unwrap();
        label.on_status(MicStatus::NoDevice).unwrap();

        assert_eq!(rx.try_recv().unwrap(), UiUpdate::Status("Status: Muted".into()));
        assert_eq!(
            rx.try_recv().unwrap(),
            UiUpdate::Status("Status: Error (No audio device)".into())
        );
    }

    #[test]
    fn closed_channel_is_an_error() {
        let (tx, rx) = channel();
        drop(rx);
        let mut label = StatusLabelObserver::new(tx);
        assert!(matches!(
            label.on_status(MicStatus::Unmuted),
            Err(ObserverError::Disconnected { .. })
        ));
    }
}
