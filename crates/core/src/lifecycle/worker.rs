//! Session worker thread
//!
//! Owns the whole hook lifetime of a session: install, wait for
//! cancellation, drain, remove.

use std::sync::Arc;

use super::{triggers, ShutdownOrigin};
use crate::crash::translator;
use crate::hooks::{DIRECT3D9_VERSION, DXGI_VERSION, TRACKER};
use crate::interception::{self, dispatch};
use crate::session::EngineSession;

pub(crate) fn run(session: Arc<EngineSession>) {
    let span = tracing::info_span!("worker", session = session.id());
    let _enter = span.enter();

    // Dropped on every exit path, unwinding included
    let _done = session.signals().take_done();
    let ready = session.signals().take_ready();

    let translate = session.config().crash_handler.enabled;
    if translate {
        translator::install();
    }

    TRACKER.reset();
    DIRECT3D9_VERSION.reset();
    DXGI_VERSION.reset();
    dispatch::publish(&session);

    triggers::install(&session, session.catalog().lifecycle_targets());
    let summary = interception::install(&session);
    tracing::debug!("Install pass finished: {:?}", summary);

    drop(ready);
    tracing::info!("Worker ready, waiting for cancellation");

    let origin = session.signals().wait_cancel();
    tracing::info!("Cancellation received ({})", origin);
    teardown(&session, origin);

    if translate {
        translator::uninstall();
    }
    tracing::info!("Worker exiting");
}

fn teardown(session: &EngineSession, origin: ShutdownOrigin) {
    let user_code = origin.allows_user_code();

    if user_code {
        session.notify_pre_unhook();
    }

    TRACKER.shutdown();
    let timeout = session.config().timeouts.drain();
    let drained = TRACKER.drain(timeout);
    if !drained {
        tracing::error!(
            "Hooked calls did not drain within {:?}, removing hooks anyway",
            timeout
        );
    }

    let failed = session.hooks().remove_all(!user_code);
    if failed > 0 {
        tracing::error!("{} hook(s) could not be removed", failed);
    }

    dispatch::retract(session, drained);
    unsafe { session.queues().release_all(session.catalog()) };

    if user_code {
        session.notify_post_unhook();
    }
}
