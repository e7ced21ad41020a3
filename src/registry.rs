//! Respawn record persistence
//!
//! A process launched in respawn mode writes its own command line to
//! `<dir>/<pid>.pid` before exec. When the supervision loop observes that
//! pid exit, it consumes the record and launches a replacement, which then
//! writes its own record under its new pid. Records therefore survive the
//! supervisor's re-execution: they live on disk, keyed by processes the
//! kernel keeps alive across the exec.
//!
//! The record format is a single line `EXEC=<argv joined by spaces>`.
//! There is no escaping; an argument containing a space does not round-trip.
//! This is a documented limitation of the on-disk format.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::uevent;

/// Default runtime directory for respawn records.
pub const RUNTIME_DIR: &str = "/run/tinit";

const EXEC_KEY: &str = "EXEC";

/// On-disk registry of respawn-eligible processes.
///
/// Concurrent writers are distinct processes each writing a file named by
/// their own pid, so no two writers ever contend for one file; the only
/// reader consumes records for pids that are already dead.
#[derive(Debug, Clone)]
pub struct Registry {
    dir: PathBuf,
}

impl Registry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Registry at the default runtime location.
    pub fn runtime() -> Self {
        Self::new(RUNTIME_DIR)
    }

    /// Create the backing directory. Pre-existing is fine.
    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    fn record_path(&self, pid: Pid) -> PathBuf {
        self.dir.join(format!("{}.pid", pid))
    }

    /// Persist the command line for `pid`. Called by the respawn daemon
    /// itself, under its own pid, after daemonizing and before exec.
    pub fn record(&self, pid: Pid, argv: &[String]) -> io::Result<()> {
        let mut file = fs::File::create(self.record_path(pid))?;
        writeln!(file, "{}={}", EXEC_KEY, argv.join(" "))
    }

    /// Consume the record for `pid`: read, parse, delete. `Ok(None)` means
    /// the process was not respawn-eligible, which is the common case and
    /// not an error. A record that does not parse is reported and left in
    /// place for [`Registry::collect_stale`].
    pub fn take(&self, pid: Pid) -> io::Result<Option<Vec<String>>> {
        let path = self.record_path(pid);

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        match parse_record(&contents) {
            Some(argv) => {
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("unlink {}: {}", path.display(), e);
                }
                Ok(Some(argv))
            }
            None => {
                log::warn!("malformed respawn record {}", path.display());
                Ok(None)
            }
        }
    }

    /// Best-effort garbage collection over the whole directory, for use at
    /// startup or periodically. An entry is discarded when its name does
    /// not parse as a pid, its process no longer exists, or `keep` rejects
    /// it; a rejected entry's process is forcibly terminated if still
    /// present. Returns the number of entries removed.
    pub fn collect_stale<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(Pid, &[String]) -> bool,
    {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("scan {}: {}", self.dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();

            let pid = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<libc::pid_t>().ok())
                .map(Pid::from_raw);

            let Some(pid) = pid else {
                log::warn!("alien entry in registry: {}", path.display());
                if remove(&path) {
                    removed += 1;
                }
                continue;
            };

            if kill(pid, None).is_err() {
                // pid is gone; the record was orphaned by an unclean stop
                if remove(&path) {
                    removed += 1;
                }
                continue;
            }

            let argv = fs::read_to_string(&path)
                .ok()
                .and_then(|contents| parse_record(&contents))
                .unwrap_or_default();

            if keep(pid, &argv) {
                continue;
            }

            if remove(&path) {
                removed += 1;
            }
            if let Err(e) = kill(pid, Signal::SIGKILL) {
                log::warn!("kill {}: {}", pid, e);
            }
        }

        removed
    }
}

fn remove(path: &std::path::Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("unlink {}: {}", path.display(), e);
            false
        }
    }
}

/// Split the `EXEC=` line back into an argument vector. Records share the
/// uevent line tokenizer, so a malformed line is reported and skipped the
/// same way a malformed hotplug line is.
fn parse_record(contents: &str) -> Option<Vec<String>> {
    for line in contents.lines() {
        match uevent::parse_line(line) {
            Ok(Some(uevent::Line::Variable { key, value })) if key == EXEC_KEY => {
                let argv: Vec<String> = value
                    .split(' ')
                    .filter(|word| !word.is_empty())
                    .map(str::to_string)
                    .collect();

                if argv.is_empty() {
                    return None;
                }
                return Some(argv);
            }
            Ok(_) => continue,
            Err(e) => {
                log::warn!("{}", e);
                continue;
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(dir.path());
        (dir, registry)
    }

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_record_round_trip() {
        let (_dir, registry) = registry();
        let pid = Pid::from_raw(4242);

        registry.record(pid, &args(&["/bin/foo", "-x"])).unwrap();
        let argv = registry.take(pid).unwrap().unwrap();

        assert_eq!(argv, args(&["/bin/foo", "-x"]));
    }

    #[test]
    fn test_take_deletes_record() {
        let (dir, registry) = registry();
        let pid = Pid::from_raw(4242);

        registry.record(pid, &args(&["/bin/foo"])).unwrap();
        registry.take(pid).unwrap();

        assert!(registry.take(pid).unwrap().is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_take_absent_is_not_an_error() {
        let (_dir, registry) = registry();
        assert!(registry.take(Pid::from_raw(4242)).unwrap().is_none());
    }

    #[test]
    fn test_record_file_format() {
        let (dir, registry) = registry();
        let pid = Pid::from_raw(77);

        registry.record(pid, &args(&["/sbin/getty", "115200", "ttyS0"])).unwrap();

        let contents = fs::read_to_string(dir.path().join("77.pid")).unwrap();
        assert_eq!(contents, "EXEC=/sbin/getty 115200 ttyS0\n");
    }

    #[test]
    fn test_parse_record_splits_on_spaces() {
        assert_eq!(
            parse_record("EXEC=/bin/foo -x\n"),
            Some(args(&["/bin/foo", "-x"]))
        );
        assert_eq!(parse_record("EXEC=/bin/foo\n"), Some(args(&["/bin/foo"])));
    }

    #[test]
    fn test_parse_record_rejects_garbage() {
        assert_eq!(parse_record(""), None);
        assert_eq!(parse_record("no separator here\n"), None);
        assert_eq!(parse_record("OTHER=/bin/foo\n"), None);
        assert_eq!(parse_record("add@/devices/tty2\n"), None);
        assert_eq!(parse_record("EXEC=\n"), None);
    }

    #[test]
    fn test_malformed_record_left_in_place() {
        let (dir, registry) = registry();
        let path = dir.path().join("99.pid");
        fs::write(&path, "not a record\n").unwrap();

        assert!(registry.take(Pid::from_raw(99)).unwrap().is_none());
        assert!(path.exists());
    }

    #[test]
    fn test_collect_stale_removes_dead_pids() {
        let (dir, registry) = registry();
        // way above any real pid_max
        fs::write(dir.path().join("2147483600.pid"), "EXEC=/bin/foo\n").unwrap();

        assert_eq!(registry.collect_stale(|_, _| true), 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_collect_stale_keeps_live_pids() {
        let (dir, registry) = registry();
        let me = Pid::this();

        registry.record(me, &args(&["/bin/foo"])).unwrap();

        assert_eq!(registry.collect_stale(|_, _| true), 0);
        assert!(dir.path().join(format!("{}.pid", me)).exists());
    }

    #[test]
    fn test_collect_stale_removes_alien_entries() {
        let (dir, registry) = registry();
        fs::write(dir.path().join("not-a-pid.pid"), "junk\n").unwrap();

        assert_eq!(registry.collect_stale(|_, _| true), 1);
    }

    #[test]
    fn test_collect_stale_passes_argv_to_predicate() {
        let (_dir, registry) = registry();
        let me = Pid::this();

        registry.record(me, &args(&["/bin/foo", "-x"])).unwrap();

        let mut seen = Vec::new();
        registry.collect_stale(|pid, argv| {
            seen.push((pid, argv.to_vec()));
            true
        });

        assert_eq!(seen, vec![(me, args(&["/bin/foo", "-x"]))]);
    }
}
