//! Session timers
//!
//! Both timers are tokio tasks holding only a weak reference to their session.
//! The abort handle is stored on the lobby, and each task carries the timer
//! generation it was armed with; the lobby rejects callbacks from any older
//! generation, so a task that fired just before being aborted cannot mutate
//! state.

use super::{Lobby, SessionHandle};
use crate::broadcast::Hub;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Start the one-second voting countdown for a lobby that just entered voting.
///
/// Call while holding the lobby lock so the abort handle is in place before
/// the first tick can run.
pub fn arm_voting_countdown(lobby: &mut Lobby, handle: &SessionHandle, hub: &Hub) {
    let generation = lobby.timer_generation();
    let period = lobby.config().tick;
    let task = tokio::spawn(run_voting_countdown(
        Arc::downgrade(handle),
        hub.clone(),
        generation,
        period,
    ));
    lobby.set_voting_timer(task.abort_handle());
}

/// Start the one-shot delay that moves a lobby from role reveal to playing
pub fn arm_reveal_delay(lobby: &mut Lobby, handle: &SessionHandle, hub: &Hub) {
    let generation = lobby.timer_generation();
    let delay = lobby.config().reveal_delay;
    let task = tokio::spawn(run_reveal_delay(
        Arc::downgrade(handle),
        hub.clone(),
        generation,
        delay,
    ));
    lobby.set_reveal_timer(task.abort_handle());
}

async fn run_voting_countdown(
    session: Weak<Mutex<Lobby>>,
    hub: Hub,
    generation: u64,
    period: Duration,
) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let Some(handle) = session.upgrade() else {
            return;
        };
        let mut lobby = handle.lock().await;
        let Some(tick) = lobby.tick_voting(generation) else {
            tracing::debug!("Stale voting timer for {} stopped", lobby.code());
            return;
        };

        if tick.resolved {
            arm_reveal_delay(&mut lobby, &handle, &hub);
        }
        hub.deliver_all(tick.outbound).await;

        if tick.resolved {
            return;
        }
    }
}

async fn run_reveal_delay(session: Weak<Mutex<Lobby>>, hub: Hub, generation: u64, delay: Duration) {
    tokio::time::sleep(delay).await;

    let Some(handle) = session.upgrade() else {
        return;
    };
    let mut lobby = handle.lock().await;
    if let Some(outbound) = lobby.finish_reveal(generation) {
        hub.deliver_all(outbound).await;
    }
}
