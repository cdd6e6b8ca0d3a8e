/// Unix-socket fan-out of detection events as JSON lines.

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

const ACCEPT_POLL: Duration = Duration::from_millis(100);
// A subscriber that stops reading is dropped after this long.
const WRITE_TIMEOUT: Duration = Duration::from_millis(250);

pub struct Broadcaster {
    path: PathBuf,
    clients: Arc<Mutex<Vec<UnixStream>>>,
}

impl Broadcaster {
    /// Bind `path` and accept subscribers on a background thread.
    pub fn bind(path: &Path) -> io::Result<Self> {
        // Clean up stale socket from previous run
        let _ = fs::remove_file(path);

        let listener = UnixListener::bind(path)?;
        // Subscribers may run as a different user than the daemon.
        fs::set_permissions(path, fs::Permissions::from_mode(0o777))?;
        listener.set_nonblocking(true)?;

        let clients: Arc<Mutex<Vec<UnixStream>>> = Arc::new(Mutex::new(Vec::new()));
        let clients_accept = clients.clone();

        thread::Builder::new()
            .name("broadcast-accept".into())
            .spawn(move || loop {
                match listener.accept() {
                    Ok((stream, _)) => {
                        info!("subscriber connected");
                        let ready = stream.set_nonblocking(false).is_ok()
                            && stream.set_write_timeout(Some(WRITE_TIMEOUT)).is_ok();
                        if ready {
                            lock(&clients_accept).push(stream);
                        }
                    }
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                        thread::sleep(ACCEPT_POLL);
                    }
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        thread::sleep(ACCEPT_POLL);
                    }
                }
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            clients,
        })
    }

    /// Write one line to every subscriber, dropping the ones that hung up.
    pub fn send(&self, line: &str) {
        let mut clients = lock(&self.clients);
        clients.retain_mut(|stream| match writeln!(stream, "{line}") {
            Ok(_) => {
                stream.flush().ok();
                true
            }
            Err(_) => {
                debug!("subscriber disconnected");
                false
            }
        });
    }

    pub fn subscribers(&self) -> usize {
        lock(&self.clients).len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn lock(clients: &Mutex<Vec<UnixStream>>) -> std::sync::MutexGuard<'_, Vec<UnixStream>> {
    clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
