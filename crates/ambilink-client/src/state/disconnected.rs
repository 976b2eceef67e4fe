use std::thread;

use super::{Connected, State};
use crate::{context::StateContext, error::ClientError};

/// No channels open.
///
/// The initial state, and the one every reconnectable failure falls back to.
/// Accepts no commands; its idle poll keeps dialing until the companion
/// answers or the client stops.
#[derive(Debug, Default)]
pub struct Disconnected;

impl Disconnected {
    pub(crate) fn idle_poll(
        &self,
        ctx: &StateContext,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<Option<State>, ClientError> {
        let mut attempts = 0u32;
        while !should_stop() {
            match Connected::from_disconnected(ctx) {
                Ok(connected) => return Ok(Some(State::Connected(connected))),
                Err(error) if error.is_reconnectable() => {
                    attempts = attempts.saturating_add(1);
                    tracing::debug!(attempts, %error, "companion not reachable, retrying");
                    thread::sleep(ctx.config().reconnect_delay);
                },
                Err(error) => return Err(error),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    };

    use super::*;
    use crate::{
        config::ClientConfig,
        observable::ObservableState,
        testing::ScriptedTransport,
        transport::{Transport, TransportError},
    };

    fn context(transport: &Arc<ScriptedTransport>) -> StateContext {
        StateContext::new(
            ClientConfig { reconnect_delay: Duration::from_millis(1), ..Default::default() },
            Arc::clone(transport) as Arc<dyn Transport>,
            Arc::new(ObservableState::new(8)),
        )
    }

    #[test]
    fn retries_refused_dials_until_connected() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..3 {
            transport.fail_dial(TransportError::ConnectionRefused("no listener".into()));
        }
        let ctx = context(&transport);

        let next = Disconnected.idle_poll(&ctx, &|| false).unwrap();
        assert!(matches!(next, Some(State::Connected(_))));
        assert!(ctx.is_connected());
    }

    #[test]
    fn fatal_dial_error_is_returned() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_dial(TransportError::Io {
            kind: std::io::ErrorKind::PermissionDenied,
            message: "denied".into(),
        });
        let ctx = context(&transport);

        let result = Disconnected.idle_poll(&ctx, &|| false);
        assert!(result.is_err_and(|e| !e.is_reconnectable()));
    }

    #[test]
    fn stop_request_ends_the_retry_loop() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..100 {
            transport.fail_dial(TransportError::TimedOut);
        }
        let ctx = context(&transport);
        let calls = AtomicBool::new(false);

        let next = Disconnected
            .idle_poll(&ctx, &|| calls.swap(true, Ordering::Relaxed))
            .unwrap();
        assert!(next.is_none());
        assert!(!ctx.is_connected());
    }
}
