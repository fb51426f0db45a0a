//! Per-iteration descriptor maintenance and readiness delivery.
//!
//! Before every blocking poll the loop asks each session's client library
//! what it wants to wait for ([`prepare`]); after the poll returns,
//! readiness events are translated back into pump calls ([`on_ready`]).
//! The library is free to change or drop its descriptor between
//! iterations (reconnection), so registrations are rebuilt on mismatch
//! instead of assumed stable.

use std::collections::HashMap;
use std::time::Duration;

use mio::event::Event;
use mio::{Interest, Registry, Token};

use crate::client::api::Readiness;
use crate::client::types::Status;
use crate::engine::channel::FdBinding;
use crate::trace::{debug, warn};

use super::Session;

fn mio_interest(readable: bool, writable: bool) -> Option<Interest> {
    match (readable, writable) {
        (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
        (true, false) => Some(Interest::READABLE),
        (false, true) => Some(Interest::WRITABLE),
        (false, false) => None,
    }
}

/// Reconciles one session's registration with its library's current
/// interest. Returns the library's timeout bound for this iteration, or
/// `None` when the session contributes no bound.
pub(crate) fn prepare(
    registry: &Registry,
    tokens: &mut HashMap<Token, crate::bridge::event::SessionTag>,
    next_token: &mut usize,
    session: &mut Session,
) -> Option<Duration> {
    let want = session.client.query_interest();
    let interest = mio_interest(want.readable, want.writable);

    // Drop a binding whose descriptor no longer matches. The library may
    // have closed the old fd already, so this is best-effort.
    if let Some(binding) = session.io.take() {
        let keep = want.fd == Some(binding.fd()) && interest.is_some();
        if keep {
            session.io = Some(binding);
        } else {
            tokens.remove(&binding.token());
            binding.deregister(registry);
            debug!(session = %session.name, "descriptor binding dropped");
        }
    }

    let (Some(fd), Some(interest)) = (want.fd, interest) else {
        return Some(want.timeout);
    };

    match session.io.as_mut() {
        Some(binding) => {
            if binding.interest() != interest {
                if let Err(err) = binding.reregister(registry, interest) {
                    warn!(session = %session.name, error = %err, "reregister failed");
                }
            }
        }
        None => {
            let token = Token(*next_token);
            *next_token += 1;
            match FdBinding::register(registry, fd, token, interest) {
                Ok(binding) => {
                    tokens.insert(token, session.tag);
                    session.io = Some(binding);
                }
                Err(err) => {
                    warn!(session = %session.name, fd, error = %err, "register failed");
                }
            }
        }
    }

    Some(want.timeout)
}

/// Delivers one readiness event to the session's pump.
pub(crate) fn on_ready(session: &Session, event: &Event) {
    let ready = Readiness {
        // Error and hangup conditions surface through the read path, where
        // the pump will observe them as a short read or EOF.
        readable: event.is_readable() || event.is_read_closed() || event.is_error(),
        writable: event.is_writable(),
    };
    let status = session.client.pump(ready);
    if !matches!(status, Status::Ok | Status::Nothing) {
        warn!(session = %session.name, status = %status, "pump reported abnormal status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_mapping_covers_all_combinations() {
        assert!(mio_interest(false, false).is_none());
        assert_eq!(mio_interest(true, false), Some(Interest::READABLE));
        assert_eq!(mio_interest(false, true), Some(Interest::WRITABLE));
        assert_eq!(
            mio_interest(true, true),
            Some(Interest::READABLE | Interest::WRITABLE)
        );
    }
}
