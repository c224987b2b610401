//! Configuration file watcher for hot reload.
//!
//! Watches the configuration file for changes (and SIGHUP on Unix) and hands
//! every successfully validated configuration to a callback.

use crate::config::{load_config, Config};
use crate::util::ShutdownSignal;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Callback type for config reload.
pub type ReloadCallback = Box<dyn Fn(Config) + Send + Sync>;

/// Configuration file watcher.
pub struct ConfigWatcher {
    config_path: PathBuf,
    reload_callback: ReloadCallback,
}

impl ConfigWatcher {
    pub fn new(config_path: PathBuf, reload_callback: ReloadCallback) -> Self {
        Self {
            config_path,
            reload_callback,
        }
    }

    /// Get the path being watched.
    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Run the watcher until shutdown.
    pub async fn run(self, shutdown: ShutdownSignal) {
        info!(path = %self.config_path.display(), "config watcher starting");

        let (tx, rx) = mpsc::channel();

        let watcher_result: Result<RecommendedWatcher, _> = Watcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default().with_poll_interval(Duration::from_secs(2)),
        );

        let mut watcher = match watcher_result {
            Ok(w) => w,
            Err(e) => {
                error!(error = %e, "failed to create file watcher");
                shutdown.wait().await;
                return;
            }
        };

        // Editors often replace the file, so watch the parent directory
        if let Some(parent) = self.config_path.parent() {
            if let Err(e) = watcher.watch(parent, RecursiveMode::NonRecursive) {
                error!(error = %e, "failed to watch config directory");
                shutdown.wait().await;
                return;
            }
        }

        #[cfg(unix)]
        let mut sighup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "failed to setup SIGHUP handler");
                None
            }
        };

        info!("config watcher ready, watching for changes");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(100)) => {
                    while let Ok(event) = rx.try_recv() {
                        if self.should_reload(&event) {
                            self.try_reload();
                        }
                    }
                }

                _ = async {
                    #[cfg(unix)]
                    {
                        if let Some(ref mut sig) = sighup {
                            sig.recv().await
                        } else {
                            std::future::pending::<Option<()>>().await
                        }
                    }
                    #[cfg(not(unix))]
                    {
                        std::future::pending::<Option<()>>().await
                    }
                } => {
                    info!("received SIGHUP, reloading configuration");
                    self.try_reload();
                }

                _ = shutdown.wait() => {
                    info!("config watcher shutting down");
                    break;
                }
            }
        }
    }

    /// Check if this event should trigger a reload.
    fn should_reload(&self, event: &Event) -> bool {
        let is_our_file = event
            .paths
            .iter()
            .any(|p| p.file_name() == self.config_path.file_name());

        let is_modify_or_create = matches!(
            event.kind,
            notify::EventKind::Modify(_) | notify::EventKind::Create(_)
        );

        is_our_file && is_modify_or_create
    }

    /// Try to reload the configuration, keeping the current one on failure.
    fn try_reload(&self) {
        info!(path = %self.config_path.display(), "attempting config reload");

        let new_config = match load_config(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "failed to load new config, keeping current");
                return;
            }
        };

        info!(
            checks = new_config.checks.len(),
            "configuration reloaded successfully"
        );
        (self.reload_callback)(new_config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    fn modify_event(path: &str) -> Event {
        Event {
            kind: notify::EventKind::Modify(notify::event::ModifyKind::Data(
                notify::event::DataChange::Content,
            )),
            paths: vec![PathBuf::from(path)],
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_should_reload_modify() {
        let watcher = ConfigWatcher::new(PathBuf::from("/test/pulsecheck.yaml"), Box::new(|_| {}));
        assert!(watcher.should_reload(&modify_event("/test/pulsecheck.yaml")));
    }

    #[test]
    fn test_should_reload_wrong_file() {
        let watcher = ConfigWatcher::new(PathBuf::from("/test/pulsecheck.yaml"), Box::new(|_| {}));
        assert!(!watcher.should_reload(&modify_event("/test/other.yaml")));
    }

    #[test]
    fn test_should_reload_delete_ignored() {
        let watcher = ConfigWatcher::new(PathBuf::from("/test/pulsecheck.yaml"), Box::new(|_| {}));
        let event = Event {
            kind: notify::EventKind::Remove(notify::event::RemoveKind::File),
            paths: vec![PathBuf::from("/test/pulsecheck.yaml")],
            attrs: Default::default(),
        };
        assert!(!watcher.should_reload(&event));
    }

    #[test]
    fn test_try_reload_invokes_callback_only_for_valid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let reloaded = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reloaded);
        let watcher = ConfigWatcher::new(
            file.path().to_path_buf(),
            Box::new(move |config: Config| sink.lock().unwrap().push(config.checks.len())),
        );

        file.write_all(b"global:\n  log_level: shouting\n").unwrap();
        watcher.try_reload();
        assert!(reloaded.lock().unwrap().is_empty());

        std::fs::write(
            file.path(),
            "checks:\n  - name: db\n    probe:\n      type: tcp\n      address: \"127.0.0.1:5432\"\n",
        )
        .unwrap();
        watcher.try_reload();
        assert_eq!(*reloaded.lock().unwrap(), vec![1]);
    }
}
