//! Text output: one line per event, name-definition lines doubled to a
//! sentinel timestamp, and the `# ##` pragmas bracketing the stream.

use std::io::Write;

use anyhow::Result;

use crate::block::RAW_VERSION;

/// Ceiling on sane output timestamps and durations, in nsec10.
pub const MAX_NSEC10: u64 = 99_900_000_000;

/// Writes the decoded event stream.
///
/// Events that reconstruct to absurd times are dropped here rather than at
/// each call site; verbose mode logs them.
pub struct EventWriter<W: Write> {
    out: W,
    pub verbose: bool,
}

impl<W: Write> EventWriter<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        EventWriter { out, verbose }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Sorts in front of all the timestamps downstream.
    pub fn version_pragma(&mut self) -> Result<()> {
        writeln!(self.out, "# ## VERSION: {}", RAW_VERSION)?;
        Ok(())
    }

    /// The OR of all incoming block flags, in particular the IPC bit.
    pub fn flags_pragma(&mut self, all_flags: u8) -> Result<()> {
        writeln!(self.out, "# ## FLAGS: {}", all_flags)?;
        Ok(())
    }

    pub fn times_pragma(&mut self, lo_seconds: f64, hi_seconds: f64) -> Result<()> {
        writeln!(self.out, "# ## TIMES: {:10.8} {:10.8}", lo_seconds, hi_seconds)?;
        Ok(())
    }

    /// Three stylized comment lines per block; downstream span reconstruction
    /// depends on these for its initial base time.
    pub fn block_comments(&mut self, word0: u64, word1: u64, blocknumber: u64) -> Result<()> {
        writeln!(
            self.out,
            "# [0] {:016x} cpu {:02x} block {}",
            word0,
            word0 >> 56,
            blocknumber
        )?;
        writeln!(
            self.out,
            "# [1] {} cpu {:02x} flags {:02x} block {}",
            format_usec_date_time(word1 & 0x00FF_FFFF_FFFF_FFFF),
            word0 >> 56,
            word1 >> 56,
            blocknumber
        )?;
        writeln!(
            self.out,
            "# TS      DUR EVENT CPU PID RPC ARG0 RETVAL IPC NAME (t and dur multiples of 10ns)"
        )?;
        Ok(())
    }

    /// A name line: `nsec10 dur event argall name`, written once at its
    /// timestamp and once at -1 so sorted readers see all names first. The
    /// event's length nibble is rewritten to the name's word count.
    pub fn name(&mut self, nsec10: u64, event: u64, argall: u32, name: &str) -> Result<()> {
        if nsec10 >= MAX_NSEC10 {
            if self.verbose {
                println!("BUG ts={}", nsec10);
            }
            return Ok(());
        }
        let dur = 1u64;
        // One initial word plus 8 chars per word.
        let len = ((name.len() as u64 + 7) >> 3) + 1;
        let event = (event & 0xF0F) | (len << 4);
        writeln!(self.out, "{} {} {} {} {}", nsec10, dur, event, argall, name)?;
        writeln!(self.out, "{} {} {} {} {}", -1i64, dur, event, argall, name)?;
        Ok(())
    }

    /// An event line:
    /// `nsec10 duration event cpu  pid rpc  arg retval ipc name (event_hex)`.
    #[allow(clippy::too_many_arguments)]
    pub fn event(
        &mut self,
        nsec10: u64,
        duration: u64,
        event: u64,
        cpu: u64,
        pid: u64,
        rpc: u64,
        arg: u64,
        retval: u64,
        ipc: u8,
        name: &str,
    ) -> Result<()> {
        if nsec10 >= MAX_NSEC10
            || duration >= MAX_NSEC10
            || nsec10 + duration >= MAX_NSEC10
        {
            if self.verbose {
                println!("BUG {} {}", nsec10, duration);
            }
            return Ok(());
        }
        writeln!(
            self.out,
            "{} {} {} {}  {} {}  {} {} {} {} ({:x})",
            nsec10, duration, event, cpu, pid, rpc, arg, retval, ipc, name, event
        )?;
        Ok(())
    }

    /// Raw fragment for the hex-entry debug prefix (no newline).
    pub fn fragment(&mut self, text: &str) -> Result<()> {
        write!(self.out, "{}", text)?;
        Ok(())
    }
}

/// usec since the epoch as `YYYY-MM-DD_HH:MM:SS.uuuuuu` in UTC, or
/// "unknown" when zero.
pub fn format_usec_date_time(us: u64) -> String {
    if us == 0 {
        return "unknown".to_string();
    }
    let seconds = (us / 1_000_000) as i64;
    let usec = us % 1_000_000;
    format!("{}.{:06}", format_seconds_date_time(seconds), usec)
}

/// Seconds since the epoch as `YYYY-MM-DD_HH:MM:SS` in UTC.
pub fn format_seconds_date_time(sec: i64) -> String {
    if sec == 0 {
        return "unknown".to_string();
    }
    let days = sec.div_euclid(86_400);
    let sod = sec.rem_euclid(86_400);
    let (y, m, d) = civil_from_days(days);
    format!(
        "{:04}-{:02}-{:02}_{:02}:{:02}:{:02}",
        y,
        m,
        d,
        sod / 3600,
        (sod / 60) % 60,
        sod % 60
    )
}

/// Gregorian calendar date for a day count relative to 1970-01-01.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture<F: FnOnce(&mut EventWriter<&mut Vec<u8>>)>(f: F) -> String {
        let mut buf = Vec::new();
        let mut w = EventWriter::new(&mut buf, false);
        f(&mut w);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn event_line_format() {
        let text = capture(|w| {
            w.event(12345, 7, 0x800, 2, 42, 0, 3, 1, 0x21, "read").unwrap()
        });
        assert_eq!(text, "12345 7 2048 2  42 0  3 1 33 read (800)\n");
    }

    #[test]
    fn name_lines_are_doubled_with_sentinel() {
        let text = capture(|w| w.name(500, 0x002, 42, "worker").unwrap());
        // "worker" is 6 chars -> 1 payload word -> length nibble 2.
        let expected_event = 0x002 | (2 << 4);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], format!("500 1 {} 42 worker", expected_event));
        assert_eq!(lines[1], format!("-1 1 {} 42 worker", expected_event));
    }

    #[test]
    fn crazy_times_are_dropped() {
        let text = capture(|w| {
            w.event(MAX_NSEC10, 0, 0x800, 0, 0, 0, 0, 0, 0, "x").unwrap();
            w.event(100, MAX_NSEC10 - 50, 0x800, 0, 0, 0, 0, 0, 0, "x")
                .unwrap();
            w.name(MAX_NSEC10 + 1, 0x002, 0, "x").unwrap();
        });
        assert_eq!(text, "");
    }

    #[test]
    fn pragma_formats() {
        let text = capture(|w| {
            w.version_pragma().unwrap();
            w.flags_pragma(131).unwrap();
            w.times_pragma(0.0, 1.25).unwrap();
        });
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# ## VERSION: 3");
        assert_eq!(lines[1], "# ## FLAGS: 131");
        assert_eq!(lines[2], "# ## TIMES: 0.00000000 1.25000000");
    }

    #[test]
    fn date_rendering() {
        assert_eq!(format_usec_date_time(0), "unknown");
        assert_eq!(
            format_usec_date_time(1_700_000_000_000_000),
            "2023-11-14_22:13:20.000000"
        );
        assert_eq!(format_seconds_date_time(86_400), "1970-01-02_00:00:00");
    }
}
