/// Metrics poll loop producing one sample per tick
pub mod metrics_poller;

/// Login tail loop following the auth log
pub mod login_tailer;

pub use login_tailer::LoginTailer;
pub use metrics_poller::{HostProviders, MetricsPoller};

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Sleep for `duration` in short slices, returning early once the running
/// flag is cleared so `stop()` never waits out a full poll interval.
pub(crate) fn sleep_while_running(duration: Duration, running: &Arc<Mutex<bool>>) {
    let slice = Duration::from_millis(250);
    let mut remaining = duration;
    while remaining > Duration::ZERO && *running.lock().unwrap() {
        let nap = std::cmp::min(remaining, slice);
        thread::sleep(nap);
        remaining = remaining.saturating_sub(nap);
    }
}
