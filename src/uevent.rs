//! Kernel uevent tokenizing
//!
//! A uevent datagram is a buffer of NUL-terminated ASCII lines. The first
//! line is a human-readable summary and carries no information the later
//! lines don't repeat; every following line is either an `ACTION@DEVPATH`
//! event header or a `KEY=VALUE` property. Parsing yields borrowed views
//! into the buffer; the input is never mutated.
//!
//! The same `KEY=VALUE` shape is reused by the respawn registry's record
//! files.

/// One parsed line of a uevent datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// `ACTION@DEVPATH` event header.
    Event { action: &'a str, devpath: &'a str },
    /// `KEY=VALUE` property.
    Variable { key: &'a str, value: &'a str },
}

#[derive(Debug, thiserror::Error)]
#[error("malformed uevent line {0:?}: expected action@devpath or key=value")]
pub struct MalformedLine(pub String);

/// Split one line at its discriminator: first `@` for events, else first
/// `=` for properties. An empty line parses to `None`; a line with neither
/// separator is malformed.
pub fn parse_line(line: &str) -> Result<Option<Line<'_>>, MalformedLine> {
    if line.is_empty() {
        return Ok(None);
    }

    if let Some((action, devpath)) = line.split_once('@') {
        return Ok(Some(Line::Event { action, devpath }));
    }

    if let Some((key, value)) = line.split_once('=') {
        return Ok(Some(Line::Variable { key, value }));
    }

    Err(MalformedLine(line.to_string()))
}

/// Walk the lines of one datagram, skipping the summary line and stopping
/// at the first empty line. A malformed line is reported and stops the
/// walk, since anything after it cannot be trusted to be line-aligned.
///
/// Returns the number of lines visited.
pub fn parse_datagram<F>(buf: &[u8], mut visit: F) -> usize
where
    F: FnMut(Line<'_>),
{
    let mut records = buf.split(|b| *b == 0);

    // summary line
    let _ = records.next();

    let mut seen = 0;
    for record in records {
        if record.is_empty() {
            break;
        }

        let Ok(line) = std::str::from_utf8(record) else {
            log::warn!("non-ASCII uevent line, dropping rest of datagram");
            break;
        };

        match parse_line(line) {
            Ok(Some(line)) => {
                visit(line);
                seen += 1;
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("{}", e);
                break;
            }
        }
    }

    seen
}

/// Terminal names that get an interactive shell on arrival: `tty2` through
/// `tty4`, and the system console.
pub fn wants_login_shell(devname: &str) -> bool {
    if devname == "console" {
        return true;
    }

    matches!(devname.as_bytes(), [b't', b't', b'y', n] if (b'2'..=b'4').contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variable() {
        let line = parse_line("DEVNAME=tty2").unwrap().unwrap();
        assert_eq!(
            line,
            Line::Variable {
                key: "DEVNAME",
                value: "tty2"
            }
        );
    }

    #[test]
    fn test_parse_event() {
        let line = parse_line("add@/devices/virtual/tty/tty2").unwrap().unwrap();
        assert_eq!(
            line,
            Line::Event {
                action: "add",
                devpath: "/devices/virtual/tty/tty2"
            }
        );
    }

    #[test]
    fn test_split_at_first_separator() {
        // value keeps any later '='
        let line = parse_line("PATH=/sbin:/bin:a=b").unwrap().unwrap();
        assert_eq!(
            line,
            Line::Variable {
                key: "PATH",
                value: "/sbin:/bin:a=b"
            }
        );

        // '@' is checked before '='
        let line = parse_line("add@/devices/x=1").unwrap().unwrap();
        assert_eq!(
            line,
            Line::Event {
                action: "add",
                devpath: "/devices/x=1"
            }
        );
    }

    #[test]
    fn test_empty_line() {
        assert!(parse_line("").unwrap().is_none());
    }

    #[test]
    fn test_malformed_line() {
        let err = parse_line("garbage").unwrap_err();
        assert!(err.to_string().contains("garbage"));
    }

    #[test]
    fn test_datagram_skips_summary() {
        let buf = b"add@/devices/tty2\0ACTION=add\0DEVNAME=tty2\0";
        let mut lines = Vec::new();
        let seen = parse_datagram(buf, |line| {
            lines.push(format!("{:?}", line));
        });
        // summary line skipped, two properties visited
        assert_eq!(seen, 2);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("DEVNAME"));
    }

    #[test]
    fn test_datagram_stops_at_empty_line() {
        let buf = b"summary\0ACTION=add\0\0DEVNAME=tty2\0";
        let seen = parse_datagram(buf, |_| {});
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_datagram_stops_at_malformed_line() {
        let buf = b"summary\0ACTION=add\0garbage\0DEVNAME=tty2\0";
        let mut devnames = 0;
        let seen = parse_datagram(buf, |line| {
            if matches!(line, Line::Variable { key: "DEVNAME", .. }) {
                devnames += 1;
            }
        });
        assert_eq!(seen, 1);
        assert_eq!(devnames, 0);
    }

    #[test]
    fn test_empty_datagram() {
        assert_eq!(parse_datagram(b"", |_| {}), 0);
        assert_eq!(parse_datagram(b"summary-only\0", |_| {}), 0);
    }

    #[test]
    fn test_wants_login_shell() {
        assert!(wants_login_shell("tty2"));
        assert!(wants_login_shell("tty3"));
        assert!(wants_login_shell("tty4"));
        assert!(wants_login_shell("console"));

        assert!(!wants_login_shell("tty1"));
        assert!(!wants_login_shell("tty5"));
        assert!(!wants_login_shell("tty22"));
        assert!(!wants_login_shell("ttyUSB0"));
        assert!(!wants_login_shell("tty"));
        assert!(!wants_login_shell(""));
    }
}
