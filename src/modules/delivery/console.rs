use chrono::{DateTime, Utc};
use std::io::{self, Write};
use std::sync::Mutex;

use super::{DeliveryError, PinDelivery};
use crate::modules::auth::User;
use crate::modules::utils::time::format_timestamp;

/// Prints the PIN to a terminal the operator controls
pub struct ConsoleDelivery {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleDelivery {
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl PinDelivery for ConsoleDelivery {
    fn deliver(
        &self,
        user: &User,
        pin: &str,
        expires_at: &DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(out, "\nPassword reset PIN for {}: {}", user.username, pin)?;
        writeln!(out, "The PIN expires at {}.", format_timestamp(expires_at))?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_console_delivery_prints_pin() {
        let buffer = SharedBuffer::default();
        let delivery = ConsoleDelivery::new(Box::new(buffer.clone()));

        let mut store = crate::modules::auth::UserStore::with_iterations(1_000);
        let user = store.add_user("alice", None, "Password123!").unwrap().clone();
        let expires_at = Utc::now();

        delivery.deliver(&user, "AB-12-CD-34", &expires_at).unwrap();

        let printed = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(printed.contains("alice"));
        assert!(printed.contains("AB-12-CD-34"));
        assert!(printed.contains(&format_timestamp(&expires_at)));
    }
}
