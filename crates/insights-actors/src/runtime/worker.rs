use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, warn};

use super::{Actor, ActorContext, Command, Runtime};

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Body of one activation: activate, serve the mailbox, deactivate.
pub(super) async fn run<A: Actor>(
    runtime: Runtime,
    key: Arc<str>,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<Command<A>>,
    stopped: watch::Sender<bool>,
) {
    let ctx = ActorContext::new(key.clone(), runtime.clone());
    let mut actor = match A::activate(ctx).await {
        Ok(actor) => actor,
        Err(e) => {
            error!(kind = A::KIND, key = %key, error = %e, "actor activation failed");
            // Dropping queued calls drops their reply senders; callers see the key as unavailable.
            rx.close();
            while rx.try_recv().is_ok() {}
            runtime.release::<A>(&key, generation).await;
            let _ = stopped.send(true);
            return;
        }
    };
    debug!(kind = A::KIND, key = %key, generation, "actor activated");

    let idle_timeout = runtime.config().actor_idle_timeout();
    let idle = sleep(idle_timeout);
    tokio::pin!(idle);

    // `interval_at` panics on a zero period; such an activation runs untimed.
    let period = actor.timer_period().filter(|period| {
        if period.is_zero() {
            warn!(kind = A::KIND, key = %key, "zero timer period, timer disabled");
        }
        !period.is_zero()
    });
    let mut ticker = period.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    let mut waiting: Vec<oneshot::Sender<()>> = Vec::new();
    loop {
        tokio::select! {
            biased;

            _ = tick(&mut ticker) => {
                if let Err(e) = actor.on_timer().await {
                    warn!(kind = A::KIND, key = %key, error = %e, "actor timer failed");
                }
            }
            command = rx.recv() => match command {
                Some(Command::Call(job)) => {
                    job(&mut actor).await;
                    idle.as_mut().reset(Instant::now() + idle_timeout);
                }
                Some(Command::Deactivate(reply)) => {
                    waiting.push(reply);
                    break;
                }
                None => break,
            },
            _ = &mut idle => {
                debug!(kind = A::KIND, key = %key, "actor idle");
                break;
            }
        }
    }

    // Anything that raced into the mailbox still runs against this activation.
    rx.close();
    while let Ok(command) = rx.try_recv() {
        match command {
            Command::Call(job) => job(&mut actor).await,
            Command::Deactivate(reply) => waiting.push(reply),
        }
    }

    if let Err(e) = actor.on_deactivate().await {
        error!(kind = A::KIND, key = %key, error = %e, "actor deactivation hook failed");
    }
    drop(actor);

    runtime.release::<A>(&key, generation).await;
    let _ = stopped.send(true);
    for reply in waiting {
        let _ = reply.send(());
    }
    debug!(kind = A::KIND, key = %key, generation, "actor deactivated");
}
