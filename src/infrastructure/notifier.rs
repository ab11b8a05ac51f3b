use crate::domain::models::NotificationPermission;
use crate::infrastructure::error::InfraError;
use log::info;
use std::sync::Mutex;

pub trait NotificationCenter: Send + Sync {
    fn permission(&self) -> NotificationPermission;
    fn request_permission(&self) -> Result<NotificationPermission, InfraError>;
    /// Has no effect unless permission is granted.
    fn show(&self, title: &str, body: &str) -> Result<(), InfraError>;
}

/// Writes notifications to the log. An undecided permission is granted on request.
#[derive(Debug)]
pub struct LogNotificationCenter {
    permission: Mutex<NotificationPermission>,
}

impl LogNotificationCenter {
    pub fn new(initial: NotificationPermission) -> Self {
        Self {
            permission: Mutex::new(initial),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, NotificationPermission>, InfraError> {
        self.permission
            .lock()
            .map_err(|error| InfraError::Notification(format!("permission lock poisoned: {error}")))
    }
}

impl NotificationCenter for LogNotificationCenter {
    fn permission(&self) -> NotificationPermission {
        self.lock()
            .map(|guard| *guard)
            .unwrap_or(NotificationPermission::Denied)
    }

    fn request_permission(&self) -> Result<NotificationPermission, InfraError> {
        let mut guard = self.lock()?;
        if *guard == NotificationPermission::Default {
            *guard = NotificationPermission::Granted;
        }
        Ok(*guard)
    }

    fn show(&self, title: &str, body: &str) -> Result<(), InfraError> {
        if self.permission() != NotificationPermission::Granted {
            return Ok(());
        }
        info!("notification: {title}: {body}");
        Ok(())
    }
}
