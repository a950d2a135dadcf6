//! Cycle-counter calibration and timestamp reconstruction arithmetic.
//!
//! The first trace block carries (start_cycles, start_usec, stop_cycles,
//! stop_usec) pairs from which we derive a linear cycles -> time mapping.
//! Emitted times are in nsec10 units (tens of nanoseconds) relative to the
//! "base minute", the largest whole minute at or before the trace start, so
//! downstream tools work with small second counts.

use anyhow::{bail, Result};

/// Sanity ceiling on microsecond and cycle magnitudes, through ~2070.
pub const USEC_PER_100_YEARS: u64 = 1_000_000 * 86_400 * 365 * 100;

/// 32-bit ARM traces count at 54 MHz and wrap about every 79 seconds.
const MHZ_32BIT_COUNTS: u64 = 54;

/// Backward jumps up to this many counts are late stores, not wraps.
pub const LATE_STORE_THRESH: u64 = 0x20000;

/// We wrapped if prior > now, except that we allow a modest amount of going
/// backwards because an interrupt entry can get recorded in the midst of
/// recording say a syscall entry, in which case the stored irq entry's
/// timestamp may be later than the subsequently-written syscall entry's
/// timestamp. We allow 4K counts backward.
#[inline]
pub fn wrapped(prior: u64, now: u64) -> bool {
    if prior <= now {
        return false;
    }
    prior > now + 4096
}

/// A late store went backward by no more than the late-store threshold; it
/// must not advance the prepend.
#[inline]
pub fn late_store(prior: u64, now: u64) -> bool {
    if prior <= now {
        return false;
    }
    prior <= now + LATE_STORE_THRESH
}

/// Linear cycles -> time mapping fixed at block 0.
///
/// F(cycles) gives usec = base_usec + (cycles - base_cycles) * slope, and in
/// output units nsec10 = (cycles - base_cycles10) * slope_nsec10, with
/// base_cycles10 chosen so the base minute maps to zero.
pub struct TimeParams {
    base_cycles: i64,
    base_usec: i64,
    base_cycles10: u64,
    base_nsec10: u64,
    slope: f64,
    slope_nsec10: f64,
    /// Coarse counter, under 10 counts/usec (riscv u74 runs at 1 MHz).
    pub low_res: bool,
}

impl TimeParams {
    /// Derive the time mapping from the first block's header words, applying
    /// the RISC-V and ARM-32 counter repairs first. Any failure here is
    /// fatal for the whole run.
    pub fn from_first_block(words: &[u64], verbose: bool) -> Result<TimeParams> {
        let mut start_counts = words[2] as i64;
        let start_usec = words[3] as i64;
        let mut stop_counts = words[4] as i64;
        let stop_usec = words[5] as i64;

        let mut delta_counts = stop_counts.wrapping_sub(start_counts);
        let mut delta_usec = stop_usec.wrapping_sub(start_usec);
        if delta_usec <= 0 {
            delta_usec = 1;
        }
        let mut counts_per_usec = delta_counts as f64 / delta_usec as f64;

        let has_32bit_counts =
            ((start_counts | stop_counts) as u64 & 0xFFFF_FFFF_0000_0000) == 0;
        let likely_riscv = block_prefix_contains(words, b"u74-mc");

        // The u74 chip sometimes sets a bogus bit<32> in stop cycles, making
        // the span 4GB too large.
        if likely_riscv
            && counts_per_usec > 100.1
            && (start_counts >> 32) == 0
            && (stop_counts >> 32) == 1
        {
            stop_counts &= 0x0000_0000_FFFF_FFFF;
            delta_counts = stop_counts.wrapping_sub(start_counts);
            counts_per_usec = delta_counts as f64 / delta_usec as f64;
            eprintln!("rawtoevent: RISC-V fixup done.");
        }

        // On ARM-32 the counter is 32 bits at 54 MHz, so stop_counts can be
        // small by a few multiples of 4G. Reconstruct the high bits from
        // elapsed gettimeofday, then nudge by one boundary if the implied
        // frequency is off by more than 12.5%.
        if has_32bit_counts && !likely_riscv {
            let elapsed_usec = delta_usec as u64;
            let expected_counts = elapsed_usec.wrapping_mul(MHZ_32BIT_COUNTS);
            let approx_hi = expected_counts & 0xFFFF_FFFF_0000_0000;
            let original_stop = stop_counts;
            stop_counts |= approx_hi as i64;
            let elapsed_counts = stop_counts.wrapping_sub(start_counts) as u64;
            let ratio = elapsed_counts / elapsed_usec;
            // A boundary nudge never reverses the span; a counter that was
            // never an ARM-32 one (short trace, faster clock) passes through
            // untouched and faces the slope checks as-is.
            if ratio > MHZ_32BIT_COUNTS + (MHZ_32BIT_COUNTS >> 3)
                && stop_counts.wrapping_sub(0x0000_0001_0000_0000) > start_counts
            {
                stop_counts = stop_counts.wrapping_sub(0x0000_0001_0000_0000);
            }
            if ratio < MHZ_32BIT_COUNTS - (MHZ_32BIT_COUNTS >> 3) && approx_hi != 0 {
                stop_counts = stop_counts.wrapping_add(0x0000_0001_0000_0000);
            }
            if stop_counts != original_stop {
                delta_counts = stop_counts.wrapping_sub(start_counts);
                counts_per_usec = delta_counts as f64 / delta_usec as f64;
                eprintln!("rawtoevent: RPi fixup done.");
            }
        }

        let low_res = counts_per_usec < 10.0;
        if low_res {
            eprintln!("rawtoevent: ... Low-resolution timestamps ...");
        }

        if verbose {
            println!(
                "% {:016x} = {}cy {}us ({} mod 1min)",
                words[2],
                start_counts,
                start_usec,
                start_usec % 60_000_000
            );
            println!("% {:016x}", words[3]);
            println!(
                "% {:016x} = {}cy {}us ({} mod 1min)",
                words[4],
                stop_counts,
                stop_usec,
                stop_usec % 60_000_000
            );
            println!("% {:016x}", words[5]);
            println!("% {:016x} unused", words[6]);
            println!("% {:016x} unused", words[7]);
            println!();
        }

        let mut fail = false;
        if counts_per_usec < 0.99 {
            eprintln!(
                "rawtoevent Fail: cycles per us {:3.1} < 0.99 MHz",
                counts_per_usec
            );
            fail = true;
        }
        if counts_per_usec > 100.1 {
            eprintln!(
                "rawtoevent Fail: cycles per us {:3.1} > 100.1 MHz",
                counts_per_usec
            );
            fail = true;
        }
        if start_counts > stop_counts {
            eprintln!(
                "rawtoevent FAIL: block[0] start_cy > stop_cy {} {}",
                start_counts, stop_counts
            );
            fail = true;
        }
        if start_usec > stop_usec {
            eprintln!(
                "rawtoevent FAIL: block[0] start_usec > stop_usec {} {}",
                start_usec, stop_usec
            );
            fail = true;
        }
        if USEC_PER_100_YEARS as i64 <= start_counts {
            eprintln!(
                "rawtoevent FAIL: block[0] start_counts crazy large {:016x}",
                start_counts
            );
            fail = true;
        }
        if USEC_PER_100_YEARS as i64 <= stop_counts {
            eprintln!(
                "rawtoevent FAIL: block[0] stop_counts crazy large {:016x}",
                stop_counts
            );
            fail = true;
        }

        if fail {
            eprintln!("rawtoevent **** FAIL in block[0] is fatal ****");
            eprintln!("     {:016x} {:016x}", words[0], words[1]);
            bail!("block 0 time calibration failed");
        }

        // Map start_counts <==> start_usec.
        let stop_for_slope = if stop_counts <= start_counts {
            start_counts + 1
        } else {
            stop_counts
        };
        let slope = (stop_usec - start_usec) as f64 / (stop_for_slope - start_counts) as f64;
        let mut params = TimeParams {
            base_cycles: start_counts,
            base_usec: start_usec,
            base_cycles10: 0,
            base_nsec10: 0,
            slope,
            slope_nsec10: slope * 100.0,
            low_res,
        };
        if verbose {
            println!("SetParams maps {:18}cy ==> {:18}us", start_counts, start_usec);
            println!("SetParams maps {:18}cy ==> {:18}us", stop_for_slope, stop_usec);
            println!(
                "          diff {:18}cy ==> {:18}us",
                stop_for_slope - start_counts,
                stop_usec - start_usec
            );
            println!(
                "SetParams slope {} us/cy ({} MHz)",
                params.slope,
                64.0 / params.slope
            );
        }

        // Round usec down to a multiple of one minute, back-map it to a
        // cycle count, and make that cycle count map to nsec10 == 0.
        let base_minute_usec = (start_usec / 60_000_000) * 60_000_000;
        let base_minute_cycle = params.usec_to_cycles(base_minute_usec);
        params.base_cycles10 = base_minute_cycle as u64;
        params.base_nsec10 = 0;
        if verbose {
            println!("SetParams10 maps {:16}cy ==> 0ns10", base_minute_cycle);
        }

        Ok(params)
    }

    /// Tens of nanoseconds since the base minute. Cycles earlier than the
    /// base minute come out as huge values and are dropped by the output
    /// range guard.
    pub fn cycles_to_nsec10(&self, cycles: u64) -> u64 {
        let delta = cycles.wrapping_sub(self.base_cycles10) as i64 as f64;
        let delta_nsec10 = (delta * self.slope_nsec10) as i64;
        self.base_nsec10.wrapping_add(delta_nsec10 as u64)
    }

    fn usec_to_cycles(&self, usec: i64) -> i64 {
        let delta_cycles = ((usec - self.base_usec) as f64 / self.slope) as i64;
        self.base_cycles + delta_cycles
    }

    /// Nominal counter rate, counts per microsecond.
    pub fn counts_per_usec(&self) -> f64 {
        1.0 / self.slope
    }
}

/// Substring search over the first 256 bytes of a block, used to recognize
/// CPU model names recorded near the front of block 0.
fn block_prefix_contains(words: &[u64], needle: &[u8]) -> bool {
    let n = words.len().min(32);
    let mut bytes = Vec::with_capacity(n * 8);
    for w in &words[..n] {
        bytes.extend_from_slice(&w.to_le_bytes());
    }
    bytes.windows(needle.len()).any(|w| w == needle)
}
