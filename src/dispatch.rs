//! Single-consumer loop turning write events into sync calls.
//!
//! Events are handled one at a time in arrival order. A sync call runs on the
//! dispatcher thread, so a slow transfer delays every event queued behind it.

use std::{
    io::{self, Write},
    path::Path,
    sync::mpsc::{Receiver, Sender},
    thread::{self, JoinHandle},
};

use notify::{
    event::{EventKind, ModifyKind},
    Event,
};

use crate::{
    config::SyncConfig,
    error::{Error, Result},
    sync::SyncAction,
};

/// Trailing string that marks a raw event on the repository metadata directory.
pub const GIT_DIR_SUFFIX: &str = ".git/";

/// What the dispatcher does when a [`SyncAction`] returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and keep processing events.
    #[default]
    Skip,
    /// Stop the dispatcher and report the error through [`DispatcherHandle::join`].
    Halt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub skipped: u64,
    pub failed: u64,
    pub facility_errors: u64,
}

pub fn is_write(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    )
}

/// Whether a write to `path` should be synced.
///
/// Only paths whose text literally ends in `.git/` are suppressed; a file
/// inside `.git` still qualifies.
pub fn is_qualifying(kind: &EventKind, path: &Path) -> bool {
    is_write(kind) && !path.to_string_lossy().ends_with(GIT_DIR_SUFFIX)
}

pub struct Dispatcher<S, W = io::Stdout> {
    config: SyncConfig,
    action: S,
    out: W,
    policy: FailurePolicy,
    stats: DispatchStats,
}

impl<S: SyncAction> Dispatcher<S> {
    pub fn new(config: SyncConfig, action: S) -> Self {
        Self {
            config,
            action,
            out: io::stdout(),
            policy: FailurePolicy::default(),
            stats: DispatchStats::default(),
        }
    }
}

impl<S: SyncAction, W: Write> Dispatcher<S, W> {
    /// Sends the "File changed" notices to `out` instead of stdout.
    pub fn with_output<W2: Write>(self, out: W2) -> Dispatcher<S, W2> {
        Dispatcher {
            config: self.config,
            action: self.action,
            out,
            policy: self.policy,
            stats: self.stats,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Consumes events until every sender of `events` is dropped.
    ///
    /// Facility errors are logged and never end the loop. A sync failure ends
    /// it only under [`FailurePolicy::Halt`].
    pub fn run(&mut self, events: Receiver<notify::Result<Event>>) -> Result<DispatchStats> {
        for received in events {
            match received {
                Ok(event) => self.handle(event)?,
                Err(e) => {
                    self.stats.facility_errors += 1;
                    tracing::error!("Error: {}", e);
                }
            }
        }
        tracing::info!(
            dispatched = self.stats.dispatched,
            skipped = self.stats.skipped,
            failed = self.stats.failed,
            facility_errors = self.stats.facility_errors,
            "event stream closed"
        );
        Ok(self.stats)
    }

    pub fn handle(&mut self, event: Event) -> Result<()> {
        for path in &event.paths {
            if !is_qualifying(&event.kind, path) {
                self.stats.skipped += 1;
                continue;
            }
            if let Err(e) = writeln!(self.out, "File changed: {}", path.display()) {
                tracing::warn!("failed to write change notice: {}", e);
            }
            match self.action.sync(path, &self.config) {
                Ok(()) => self.stats.dispatched += 1,
                Err(e) => {
                    self.stats.failed += 1;
                    match self.policy {
                        FailurePolicy::Skip => {
                            tracing::warn!(path = %path.display(), "sync failed, skipping: {}", e)
                        }
                        FailurePolicy::Halt => {
                            tracing::error!(path = %path.display(), "sync failed, stopping: {}", e);
                            return Err(e);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl<S, W> Dispatcher<S, W>
where
    S: SyncAction + Send + 'static,
    W: Write + Send + 'static,
{
    /// Runs the dispatcher on its own thread.
    pub fn spawn(self, events: Receiver<notify::Result<Event>>) -> Result<DispatcherHandle> {
        self.spawn_inner(events, None)
    }

    /// Like [`Dispatcher::spawn`], and sends on `exited` once the thread stops
    /// for any reason, panics included.
    pub fn spawn_supervised(
        self,
        events: Receiver<notify::Result<Event>>,
        exited: Sender<()>,
    ) -> Result<DispatcherHandle> {
        self.spawn_inner(events, Some(exited))
    }

    fn spawn_inner(
        mut self,
        events: Receiver<notify::Result<Event>>,
        exited: Option<Sender<()>>,
    ) -> Result<DispatcherHandle> {
        let thread = thread::Builder::new()
            .name("dispatcher".into())
            .spawn(move || {
                let _exit = ExitSignal(exited);
                self.run(events)
            })?;
        Ok(DispatcherHandle { thread })
    }
}

/// Signals on drop so that unwinding out of the dispatcher still reports.
struct ExitSignal(Option<Sender<()>>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Handle to a dispatcher thread.
#[derive(Debug)]
pub struct DispatcherHandle {
    thread: JoinHandle<Result<DispatchStats>>,
}

impl DispatcherHandle {
    /// Waits for the dispatcher to stop and returns how it ended.
    pub fn join(self) -> Result<DispatchStats> {
        self.thread.join().map_err(|_| Error::DispatcherPanicked)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind};
    use pretty_assertions::assert_eq;
    use std::{
        path::PathBuf,
        sync::{mpsc, Arc, Mutex},
        time::Duration,
    };

    fn write_event(path: &str) -> Event {
        Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(path.into())
    }

    /// Records sync calls into a log shared with the test.
    #[derive(Clone, Default)]
    struct Recording {
        log: Arc<Mutex<Vec<String>>>,
        fail: Option<PathBuf>,
    }

    impl SyncAction for Recording {
        fn sync(&mut self, path: &Path, config: &SyncConfig) -> Result<()> {
            let mut log = self.log.lock().unwrap();
            log.push(format!("start {}", path.display()));
            if self.fail.as_deref() == Some(path) {
                return Err(Error::Sync {
                    path: path.to_path_buf(),
                    reason: format!("{} unreachable", config.remote_host),
                });
            }
            log.push(format!("end {}", path.display()));
            Ok(())
        }
    }

    #[test]
    fn test_filter() {
        let write = EventKind::Modify(ModifyKind::Data(DataChange::Any));
        assert!(is_qualifying(&write, Path::new("/repo/src/main.rs")));
        assert!(is_qualifying(&EventKind::Modify(ModifyKind::Any), Path::new("a")));
        // literal suffix match only
        assert!(is_qualifying(&write, Path::new("/repo/.git/index")));
        assert!(is_qualifying(&write, Path::new("/repo/.git")));
        assert!(!is_qualifying(&write, &PathBuf::from("/repo/.git/")));

        let create = EventKind::Create(CreateKind::File);
        assert!(!is_qualifying(&create, Path::new("/repo/a.rs")));
        let chmod = EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions));
        assert!(!is_qualifying(&chmod, Path::new("/repo/a.rs")));
        let close = EventKind::Access(AccessKind::Any);
        assert!(!is_qualifying(&close, Path::new("/repo/a.rs")));
    }

    #[test]
    fn test_dispatch_in_arrival_order() {
        let action = Recording::default();
        let log = action.log.clone();
        let (tx, rx) = mpsc::channel();
        tx.send(Ok(write_event("/repo/a.txt"))).unwrap();
        tx.send(Ok(write_event("/repo/b.txt"))).unwrap();
        drop(tx);

        let mut dispatcher = Dispatcher::new(SyncConfig::default(), action).with_output(Vec::new());
        let stats = dispatcher.run(rx).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start /repo/a.txt", "end /repo/a.txt", "start /repo/b.txt", "end /repo/b.txt"]
        );
        assert_eq!(stats.dispatched, 2);
        assert_eq!(
            String::from_utf8(dispatcher.out.clone()).unwrap(),
            "File changed: /repo/a.txt\nFile changed: /repo/b.txt\n"
        );
    }

    #[test]
    fn test_non_qualifying_events_are_skipped() {
        let action = Recording::default();
        let log = action.log.clone();
        let (tx, rx) = mpsc::channel();
        tx.send(Ok(Event::new(EventKind::Create(CreateKind::File)).add_path("/repo/new.rs".into())))
            .unwrap();
        tx.send(Ok(write_event("/repo/.git/"))).unwrap();
        drop(tx);

        let stats = Dispatcher::new(SyncConfig::default(), action)
            .with_output(io::sink())
            .run(rx)
            .unwrap();

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.dispatched, 0);
    }

    #[test]
    fn test_facility_errors_do_not_stop_loop() {
        let action = Recording::default();
        let log = action.log.clone();
        let (tx, rx) = mpsc::channel();
        tx.send(Err(notify::Error::generic("queue overflow"))).unwrap();
        tx.send(Ok(write_event("/repo/a.txt"))).unwrap();
        drop(tx);

        let stats = Dispatcher::new(SyncConfig::default(), action)
            .with_output(io::sink())
            .run(rx)
            .unwrap();

        assert_eq!(stats.facility_errors, 1);
        assert_eq!(stats.dispatched, 1);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_skip_policy_continues_after_failure() {
        let action = Recording {
            fail: Some(PathBuf::from("/repo/a.txt")),
            ..Recording::default()
        };
        let log = action.log.clone();
        let (tx, rx) = mpsc::channel();
        tx.send(Ok(write_event("/repo/a.txt"))).unwrap();
        tx.send(Ok(write_event("/repo/b.txt"))).unwrap();
        drop(tx);

        let stats = Dispatcher::new(SyncConfig::default(), action)
            .with_output(io::sink())
            .run(rx)
            .unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.dispatched, 1);
        assert_eq!(log.lock().unwrap().last().unwrap(), "end /repo/b.txt");
    }

    #[test]
    fn test_halt_policy_reports_through_handle() {
        let action = Recording {
            fail: Some(PathBuf::from("/repo/a.txt")),
            ..Recording::default()
        };
        let log = action.log.clone();
        let (tx, rx) = mpsc::channel();
        tx.send(Ok(write_event("/repo/a.txt"))).unwrap();
        tx.send(Ok(write_event("/repo/b.txt"))).unwrap();
        let config = SyncConfig {
            remote_host: "mirror.local".into(),
            ..SyncConfig::default()
        };

        let handle = Dispatcher::new(config, action)
            .with_output(io::sink())
            .with_policy(FailurePolicy::Halt)
            .spawn(rx)
            .unwrap();

        let err = handle.join().unwrap_err();
        assert_eq!(err.to_string(), "failed to sync /repo/a.txt: mirror.local unreachable");
        assert_eq!(*log.lock().unwrap(), vec!["start /repo/a.txt"]);
    }

    #[test]
    fn test_closing_channel_stops_spawned_dispatcher() {
        let (tx, rx) = mpsc::channel();
        let handle = Dispatcher::new(SyncConfig::default(), Recording::default())
            .with_output(io::sink())
            .spawn(rx)
            .unwrap();
        tx.send(Ok(write_event("/repo/a.txt"))).unwrap();
        drop(tx);

        let stats = handle.join().unwrap();
        assert_eq!(stats.dispatched, 1);
    }

    struct Panicking;

    impl SyncAction for Panicking {
        fn sync(&mut self, path: &Path, _: &SyncConfig) -> Result<()> {
            panic!("transfer of {} blew up", path.display());
        }
    }

    #[test]
    fn test_supervised_dispatcher_reports_panic() {
        let (tx, rx) = mpsc::channel();
        let (exit_tx, exit_rx) = mpsc::channel();
        let handle = Dispatcher::new(SyncConfig::default(), Panicking)
            .with_output(io::sink())
            .spawn_supervised(rx, exit_tx)
            .unwrap();
        tx.send(Ok(write_event("/repo/a.txt"))).unwrap();

        // the sender is still alive, so only the exit signal can wake us
        exit_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(handle.join(), Err(Error::DispatcherPanicked)));
        drop(tx);
    }

    #[test]
    fn test_supervised_dispatcher_reports_halt() {
        let action = Recording {
            fail: Some(PathBuf::from("/repo/a.txt")),
            ..Recording::default()
        };
        let (tx, rx) = mpsc::channel();
        let (exit_tx, exit_rx) = mpsc::channel();
        let handle = Dispatcher::new(SyncConfig::default(), action)
            .with_output(io::sink())
            .with_policy(FailurePolicy::Halt)
            .spawn_supervised(rx, exit_tx)
            .unwrap();
        tx.send(Ok(write_event("/repo/a.txt"))).unwrap();

        exit_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(handle.join(), Err(Error::Sync { .. })));
        drop(tx);
    }

    #[test]
    fn test_event_with_several_paths() {
        let action = Recording::default();
        let log = action.log.clone();
        let event = write_event("/repo/a.txt").add_path("/repo/.git/".into());
        let mut dispatcher = Dispatcher::new(SyncConfig::default(), action).with_output(io::sink());
        dispatcher.handle(event).unwrap();

        assert_eq!(dispatcher.stats().dispatched, 1);
        assert_eq!(dispatcher.stats().skipped, 1);
        assert_eq!(log.lock().unwrap().len(), 2);
    }
}
