//! Periodic reload task.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use crate::observability::metrics;
use crate::reload::Reloadable;

/// Minimum wait between two checks of the same file.
pub const RELOAD_FLOOR: Duration = Duration::from_secs(1);

/// Spawn the reload task for `reloadable` watching `path`.
///
/// The task holds a weak reference and exits once the reloadable is
/// stopped or dropped. Outside a Tokio runtime nothing is spawned.
pub fn spawn<R>(reloadable: &Arc<R>, path: impl Into<PathBuf>)
where
    R: Reloadable + 'static,
{
    let path = path.into();
    let weak: Weak<dyn Reloadable> = Arc::downgrade(reloadable) as Weak<dyn Reloadable>;

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(period_reload(weak, path));
        }
        Err(_) => {
            tracing::warn!(path = %path.display(), "No runtime available, live reload disabled");
        }
    }
}

/// Re-read `path` into the reloadable whenever its modification time advances.
///
/// The caller has already loaded the file once, so the task waits a period
/// before its first check and treats the mtime seen at start as current.
/// Runs until the reloadable is stopped or dropped. Read and reload errors are
/// logged and the previous contents stay in place.
pub async fn period_reload(reloadable: Weak<dyn Reloadable>, path: PathBuf) {
    let mut last_mod = modified(&path).await;

    loop {
        let Some((r, period)) = live(&reloadable, &path) else {
            return;
        };
        let wait = period.max(RELOAD_FLOOR);
        let stop = r.stop_signal().subscribe();
        // Only the weak reference is held while idle.
        drop(r);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = stop.fired() => {}
        }

        let Some((r, period)) = live(&reloadable, &path) else {
            return;
        };
        if period > Duration::ZERO {
            match check(r.as_ref(), &path, last_mod).await {
                Ok(mtime) => last_mod = Some(mtime),
                Err(e) => {
                    metrics::record_reload(false);
                    tracing::warn!(path = %path.display(), error = %e, "Reload failed, keeping previous contents");
                }
            }
        }
    }
}

/// The reloadable and its period, unless it was dropped or stopped.
fn live(reloadable: &Weak<dyn Reloadable>, path: &Path) -> Option<(Arc<dyn Reloadable>, Duration)> {
    let Some(r) = reloadable.upgrade() else {
        tracing::debug!(path = %path.display(), "Reloadable dropped, reload task exiting");
        return None;
    };
    match r.period() {
        Some(period) if !r.stopped() => Some((r, period)),
        _ => {
            tracing::info!(path = %path.display(), "Reload stopped");
            None
        }
    }
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

/// Reload `path` if it changed since `last_mod`; returns the observed mtime.
async fn check(
    r: &dyn Reloadable,
    path: &Path,
    last_mod: Option<SystemTime>,
) -> Result<SystemTime, crate::reload::ReloadError> {
    let mtime = tokio::fs::metadata(path).await?.modified()?;
    if last_mod == Some(mtime) {
        return Ok(mtime);
    }

    let data = tokio::fs::read(path).await?;
    tracing::info!(path = %path.display(), "Reloading");
    r.reload(&mut Cursor::new(data))?;
    metrics::record_reload(true);
    Ok(mtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Signal;
    use crate::reload::ReloadError;
    use std::io::BufRead;
    use std::sync::Mutex;

    struct Recorder {
        contents: Mutex<Vec<String>>,
        period: Duration,
        stop: Signal,
    }

    impl Recorder {
        fn new(period: Duration) -> Self {
            Self {
                contents: Mutex::new(Vec::new()),
                period,
                stop: Signal::new(),
            }
        }
    }

    impl Reloadable for Recorder {
        fn reload(&self, reader: &mut dyn BufRead) -> Result<(), ReloadError> {
            let mut s = String::new();
            reader.read_to_string(&mut s)?;
            self.contents.lock().unwrap().push(s);
            Ok(())
        }

        fn period(&self) -> Option<Duration> {
            if self.stopped() {
                None
            } else {
                Some(self.period)
            }
        }

        fn stop_signal(&self) -> &Signal {
            &self.stop
        }
    }

    fn touch_later(path: &Path, contents: &str) {
        std::fs::write(path, contents).unwrap();
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();
    }

    #[tokio::test]
    async fn unchanged_file_is_not_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "one").unwrap();

        let r = Arc::new(Recorder::new(Duration::from_millis(10)));
        let weak: Weak<dyn Reloadable> = Arc::downgrade(&r) as Weak<dyn Reloadable>;
        let task = tokio::spawn(period_reload(weak, path));

        tokio::time::sleep(RELOAD_FLOOR + Duration::from_millis(500)).await;
        assert!(r.contents.lock().unwrap().is_empty());

        r.stop();
        tokio::time::timeout(Duration::from_millis(500), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn reloads_after_change_then_stops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "one").unwrap();

        let r = Arc::new(Recorder::new(Duration::from_millis(10)));
        let weak: Weak<dyn Reloadable> = Arc::downgrade(&r) as Weak<dyn Reloadable>;
        let task = tokio::spawn(period_reload(weak, path.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        touch_later(&path, "two");
        tokio::time::sleep(RELOAD_FLOOR + Duration::from_millis(500)).await;
        assert_eq!(r.contents.lock().unwrap().as_slice(), ["two".to_string()]);

        r.stop();
        tokio::time::timeout(Duration::from_millis(500), task)
            .await
            .expect("task should exit promptly after stop")
            .unwrap();
    }

    #[tokio::test]
    async fn exits_when_reloadable_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "x").unwrap();

        let r = Arc::new(Recorder::new(Duration::ZERO));
        let weak: Weak<dyn Reloadable> = Arc::downgrade(&r) as Weak<dyn Reloadable>;
        let task = tokio::spawn(period_reload(weak, path));
        drop(r);

        tokio::time::timeout(RELOAD_FLOOR * 2, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn zero_period_does_not_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "x").unwrap();

        let r = Arc::new(Recorder::new(Duration::ZERO));
        let weak: Weak<dyn Reloadable> = Arc::downgrade(&r) as Weak<dyn Reloadable>;
        let task = tokio::spawn(period_reload(weak, path));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(r.contents.lock().unwrap().is_empty());

        r.stop();
        tokio::time::timeout(Duration::from_millis(500), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn missing_file_keeps_task_alive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");

        let r = Arc::new(Recorder::new(Duration::from_millis(10)));
        let weak: Weak<dyn Reloadable> = Arc::downgrade(&r) as Weak<dyn Reloadable>;
        let task = tokio::spawn(period_reload(weak, path));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        r.stop();
        tokio::time::timeout(Duration::from_millis(500), task).await.unwrap().unwrap();
    }
}
