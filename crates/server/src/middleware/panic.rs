//! Panic capture helpers.
//!
//! `catch_unwind` only hands back the payload, so a process-wide hook stashes
//! the backtrace of the panicking thread where the guard can pick it up. The
//! hook only captures while a handler is being polled through [`capturing`].

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::sync::Once;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
    static ARMED: Cell<bool> = const { Cell::new(false) };
}

static INSTALL: Once = Once::new();

/// Installs the capturing hook once per process, chained in front of the
/// previous hook.
pub(crate) fn install_hook() {
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if ARMED.with(Cell::get) {
                let stack = Backtrace::force_capture().to_string();
                LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(stack));
            }
            previous(info);
        }));
    });
}

/// Restores the previous flag on drop, unwinding included.
struct Armed(bool);

impl Armed {
    fn set() -> Self {
        Self(ARMED.with(|flag| flag.replace(true)))
    }
}

impl Drop for Armed {
    fn drop(&mut self) {
        ARMED.with(|flag| flag.set(self.0));
    }
}

/// Polls `fut` with the hook armed, so a panic inside it leaves a backtrace.
pub(crate) async fn capturing<F: Future>(fut: F) -> F::Output {
    let mut fut = std::pin::pin!(fut);
    std::future::poll_fn(|cx| {
        let _armed = Armed::set();
        fut.as_mut().poll(cx)
    })
    .await
}

/// Backtrace of the last captured panic on this thread.
///
/// The handler and its guard are polled together, so the panic and the catch
/// happen on the same worker thread.
pub(crate) fn take_backtrace() -> String {
    LAST_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

pub(crate) fn message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_from_payload() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(message(&*payload), "boom");

        let payload = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(message(&*payload), "code 7");

        let payload = std::panic::catch_unwind(|| std::panic::panic_any(42_u8)).unwrap_err();
        assert_eq!(message(&*payload), "unknown panic");
    }

    #[test]
    fn test_hook_captures_only_while_armed() {
        install_hook();
        let _ = std::panic::catch_unwind(|| panic!("outside"));
        assert!(LAST_BACKTRACE.with(|slot| slot.borrow().is_none()));

        let _ = std::panic::catch_unwind(|| {
            let _armed = Armed::set();
            panic!("inside");
        });
        assert!(LAST_BACKTRACE.with(|slot| slot.borrow().is_some()));
        assert!(!take_backtrace().is_empty());
        assert!(!ARMED.with(Cell::get));
    }

    #[tokio::test]
    async fn test_capturing_arms_during_poll() {
        install_hook();
        let armed = capturing(async { ARMED.with(Cell::get) }).await;
        assert!(armed);
        assert!(!ARMED.with(Cell::get));
    }
}
