//! The decoder proper: walks trace blocks in order, reconstructs full
//! cycle timestamps from the 20-bit truncated per-entry stamps, classifies
//! each 64-bit entry, and emits one text line per surviving event.
//!
//! Entry layout:
//!
//! ```text
//! +-------------------+-----------+---------------+-------+-------+
//! | timestamp         | event     | delta | retval|      arg0     |
//! +-------------------+-----------+---------------+-------+-------+
//!          20              12         8       8           16
//! ```
//!
//! Name definitions carry 1-7 extra payload words; PC samples carry one.

use std::collections::HashSet;
use std::io::{Read, Write};

use anyhow::{bail, Context, Result};

use crate::block::{self, BlockReader, TraceBlock, WORDS_PER_BLOCK};
use crate::events;
use crate::names::{self, IdlePids, NameTable};
use crate::output::EventWriter;
use crate::time::{late_store, wrapped, TimeParams, USEC_PER_100_YEARS};

/// Per-CPU state ceiling; block headers naming a CPU at or above this fail
/// the block sanity check.
pub const MAX_CPUS: usize = 80;

/// Low-res counters make a delta_t of 1 mean "under one tick": report
/// 350 ns instead of one 10 ns count.
const DEFAULT_LOW_RES_NSEC10: u64 = 35;

/// TSDELTA arguments at or above this are slightly-backward time,
/// sign-extended; below it they are forward advances.
const LARGE_TSDELTA: u64 = 2_000_000_000;

const MASK56: u64 = 0x00FF_FFFF_FFFF_FFFF;

/// nsec10 per minute, for the trailing whole-minute reduction.
const NSEC10_PER_MINUTE: u64 = 6_000_000_000;

#[derive(Clone, Copy, Debug)]
pub struct DecodeOptions {
    pub verbose: bool,
    pub hexevent: bool,
    pub maxblock: u64,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            verbose: false,
            hexevent: false,
            maxblock: u64::MAX,
        }
    }
}

/// Reconstruction state for one CPU.
#[derive(Clone)]
struct CpuState {
    current_pid: u64,
    current_rpc: u64,
    /// For moving PC samples back to just before the timer IRQ that took them.
    prior_timer_irq_nsec10: u64,
    /// Cleared once this CPU's first block preamble has been seen.
    at_first_block: bool,
}

impl Default for CpuState {
    fn default() -> Self {
        CpuState {
            current_pid: 0,
            current_rpc: 0,
            prior_timer_irq_nsec10: 0,
            at_first_block: true,
        }
    }
}

/// Counters accumulated over the whole run.
pub struct DecodeStats {
    pub event_count: u64,
    pub ctx_switches: u64,
    pub total_marks: u64,
    /// Indexed by the high nibble of the event number.
    pub events_by_type: [u64; 16],
    pub lo_timestamp: u64,
    pub hi_timestamp: u64,
    pub unique_cpus: HashSet<u64>,
    pub unique_pids: HashSet<u64>,
    pub blocks: u64,
    pub lo_seconds: f64,
    pub hi_seconds: f64,
    pub elapsed_seconds: f64,
}

impl Default for DecodeStats {
    fn default() -> Self {
        DecodeStats {
            event_count: 0,
            ctx_switches: 0,
            total_marks: 0,
            events_by_type: [0; 16],
            lo_timestamp: i64::MAX as u64,
            hi_timestamp: 0,
            unique_cpus: HashSet::new(),
            unique_pids: HashSet::new(),
            blocks: 0,
            lo_seconds: 0.0,
            hi_seconds: 0.0,
            elapsed_seconds: 0.0,
        }
    }
}

/// Whole-run decoder state.
pub struct Decoder {
    opts: DecodeOptions,
    params: Option<TimeParams>,
    names: NameTable,
    idle_pids: IdlePids,
    cpus: Vec<CpuState>,
    /// Learned from the trace's own name entries; kernel versions move
    /// these numbers around.
    pub timer_irq_event: u64,
    pub sched_event: u64,
    all_flags: u8,
    first_flags: u8,
    pub stats: DecodeStats,
}

impl Decoder {
    pub fn new(opts: DecodeOptions) -> Self {
        Decoder {
            opts,
            params: None,
            names: NameTable::new(),
            idle_pids: IdlePids::default(),
            cpus: vec![CpuState::default(); MAX_CPUS],
            timer_irq_event: events::DEFAULT_TIMER_IRQ_EVENT,
            sched_event: events::DEFAULT_SCHED_EVENT,
            all_flags: 0,
            first_flags: 0,
            stats: DecodeStats::default(),
        }
    }

    /// Decode the whole input stream, writing the event stream to `out`.
    /// Only a block-0 failure is fatal; later bad blocks are skipped.
    pub fn run<R: Read, W: Write>(&mut self, input: R, out: W) -> Result<()> {
        let mut writer = EventWriter::new(out, self.opts.verbose);
        writer.version_pragma()?;

        let mut reader = BlockReader::new(input);
        let mut blocknumber: u64 = 0;
        while let Some(trace_block) = reader.next_block()? {
            if blocknumber >= self.opts.maxblock {
                break;
            }
            self.decode_block(&trace_block, blocknumber, &mut writer)?;
            blocknumber += 1;
        }
        self.stats.blocks = blocknumber;

        writer.flags_pragma(self.all_flags)?;

        // Reduce timestamps to start at no more than 60 seconds after the
        // base minute. With wraparound tracing the true lo_timestamp is not
        // known until possibly the very last block, so the reduction happens
        // here; the larger times already in the stream are reduced by the
        // span reconstruction that reads this output.
        let extra_minutes = self.stats.lo_timestamp / NSEC10_PER_MINUTE;
        let offset = extra_minutes * NSEC10_PER_MINUTE;
        let lo = self.stats.lo_timestamp.wrapping_sub(offset);
        let hi = self.stats.hi_timestamp.wrapping_sub(offset);
        let mut lo_seconds = lo as f64 / 100_000_000.0;
        let mut hi_seconds = hi as f64 / 100_000_000.0;
        if hi_seconds > 999.0 {
            eprintln!("BUG: hi_seconds > 999.0 {:12.8}", hi_seconds);
        }
        let mut total_seconds = hi_seconds - lo_seconds;
        if total_seconds <= 0.0 {
            lo_seconds = 0.0;
            hi_seconds = 1.0;
            total_seconds = 1.0;
        }
        writer.times_pragma(lo_seconds, hi_seconds)?;
        self.stats.lo_seconds = lo_seconds;
        self.stats.hi_seconds = hi_seconds;
        self.stats.elapsed_seconds = total_seconds;

        let mut out = writer.into_inner();
        out.flush().context("flushing event stream")?;
        Ok(())
    }

    /// The end-of-run stderr summary; verbose mode adds the breakdown.
    pub fn print_summary(&self) {
        let s = &self.stats;
        eprintln!("rawtoevent: {} events", s.event_count);
        eprintln!(
            "  {:5.3} elapsed seconds: {:5.3} to {:5.3}",
            s.elapsed_seconds, s.lo_seconds, s.hi_seconds
        );
        if self.opts.verbose {
            let total_irqs = s.events_by_type[5] + s.events_by_type[7];
            let total_traps = s.events_by_type[4] + s.events_by_type[6];
            let total_sys64 = s.events_by_type[8]
                + s.events_by_type[9]
                + s.events_by_type[10]
                + s.events_by_type[11];
            let total_sys32 = s.events_by_type[12]
                + s.events_by_type[13]
                + s.events_by_type[14]
                + s.events_by_type[15];
            eprintln!(
                "  {} IRQ, {} Trap, {} Sys64, {} Sys32, {} Mark",
                total_irqs, total_traps, total_sys64, total_sys32, s.total_marks
            );
            eprintln!(
                "  {} CPUs, {} PIDs, {} context-switches",
                s.unique_cpus.len(),
                s.unique_pids.len(),
                s.ctx_switches
            );
        }
    }

    fn decode_block<W: Write>(
        &mut self,
        trace_block: &TraceBlock,
        blocknumber: u64,
        w: &mut EventWriter<W>,
    ) -> Result<()> {
        let words = &trace_block.words;
        let current_cpu = trace_block.cpu();
        let base_cycle = trace_block.base_cycle();
        let flags = trace_block.flags();
        let gtod = trace_block.gettimeofday_usec();

        w.block_comments(words[0], words[1], blocknumber)?;
        if self.opts.verbose || self.opts.hexevent {
            println!("% {:02x} {:014x}", words[0] >> 56, words[0] & MASK56);
            println!("% {:02x} {:014x}", words[1] >> 56, words[1] & MASK56);
        }

        let mut fail = false;
        if current_cpu >= MAX_CPUS as u64 {
            eprintln!(
                "rawtoevent FAIL: block[{}] CPU number {} > max {}",
                blocknumber, current_cpu, MAX_CPUS
            );
            fail = true;
        }
        // No constraints on base_cycle or flags.
        if USEC_PER_100_YEARS <= gtod {
            eprintln!(
                "rawtoevent FAIL: block[{}] gettimeofday crazy large {:016x}",
                blocknumber, gtod
            );
            fail = true;
        }

        self.all_flags |= flags;

        let mut first_real_entry: usize = 2;
        let very_first_block = blocknumber == 0;
        if very_first_block {
            first_real_entry = 8;
            self.first_flags = flags;
            if fail {
                eprintln!("rawtoevent **** FAIL in block[0] is fatal ****");
                eprintln!("     {:016x} {:016x}", words[0], words[1]);
                bail!("block 0 header sanity check failed");
            }
            self.params = Some(TimeParams::from_first_block(
                words,
                self.opts.verbose || self.opts.hexevent,
            )?);
        }

        if fail {
            eprintln!(
                "rawtoevent **** FAIL -- skipping block[{}] ****",
                blocknumber
            );
            eprintln!("     {:016x} {:016x}", words[0], words[1]);
            for (i, word) in words.iter().take(16).enumerate() {
                eprintln!("  [{}] {:016x}", i, word);
            }
            return Ok(());
        }

        let params = self.params.as_ref().context("time calibration missing")?;
        let cpu_idx = current_cpu as usize;
        self.stats.unique_cpus.insert(current_cpu);

        // High bits to prepend to each entry's truncated timestamp. The
        // block's base cycle count may be a bit later than the first entry
        // and may have wrapped in its low 20 bits; if so the high bits we
        // want are one smaller.
        let mut prepend = base_cycle & !0xFFFFF;
        let first_timestamp = words[first_real_entry] >> 44;
        let mut prior_t = first_timestamp;

        // A wraparound trace overwrote its oldest blocks, so block 0 holds
        // only the names worth keeping.
        let keep_just_names = block::has_wraparound(self.first_flags) && very_first_block;

        if block::tracefile_version(self.first_flags) >= 3 {
            // Every block carries PID and command name up front; the CPU
            // frequency may ride in the first block per CPU.
            let pre = trace_block.preamble(first_real_entry);
            let mut pid = names::remap_high_pid(pre.pid);
            let mut comm = pre.comm.clone();
            self.idle_pids.fixup(&mut pid, &mut comm);

            if self.opts.verbose || self.opts.hexevent {
                if self.cpus[cpu_idx].at_first_block {
                    eprintln!(
                        "rawtoevent block[{}] cpu {} pid {} freq {} {}",
                        blocknumber, current_cpu, pid, pre.freq_mhz, comm
                    );
                }
                println!("% {:016x} pid {}", words[first_real_entry], pid);
                println!("% {:016x} unused", words[first_real_entry + 1]);
                println!("% {:016x} name {}", words[first_real_entry + 2], comm);
                println!("% {:016x} name", words[first_real_entry + 3]);
                println!();
            }

            let name = names::make_safe_ascii(&names::reduce_spaces(&comm));
            self.names.insert(events::pid_to_event(pid), name.clone());

            // Anchor the name at the block base so downstream reconstruction
            // can refresh its stack.
            let nsec10 = params.cycles_to_nsec10(base_cycle);
            w.name(nsec10, events::PIDNAME, pid as u32, &name)?;

            self.stats.unique_pids.insert(pid);
            if self.cpus[cpu_idx].current_pid != pid {
                self.stats.ctx_switches += 1;
            }
            self.cpus[cpu_idx].current_pid = pid;

            // The block-boundary PID is almost surely the process already
            // running, not a context switch, so no event is emitted here --
            // except once per CPU to establish the initial process (and the
            // initial frequency when the preamble carries one).
            if !keep_just_names && self.cpus[cpu_idx].at_first_block {
                self.cpus[cpu_idx].at_first_block = false;
                let name = names::append_num(&name, pid);
                w.event(
                    nsec10,
                    1,
                    events::USERPID,
                    current_cpu,
                    pid,
                    0,
                    0,
                    0,
                    0,
                    &name,
                )?;
                if pre.freq_mhz > 0 {
                    w.event(
                        nsec10,
                        1,
                        events::PSTATE,
                        current_cpu,
                        pid,
                        0,
                        pre.freq_mhz,
                        0,
                        0,
                        "-freq-",
                    )?;
                }
            }

            first_real_entry += 4;
        }

        if wrapped(first_timestamp, base_cycle) {
            prepend = prepend.wrapping_sub(0x100000);
        }

        let mut i = first_real_entry;
        while i < WORDS_PER_BLOCK {
            let entry_i = i;
            i += 1;

            let word = words[entry_i];
            // Skip all-zero NOP entries; an all-ones entry ends the block.
            if word == 0 {
                continue;
            }
            if word == u64::MAX {
                break;
            }

            let mut has_arg = false;
            let mut extra_word = false;
            let mut deferred_rpcid0 = false;
            let mut ipc = trace_block.ipc[entry_i];

            let t = word >> 44;
            let mut n = (word >> 32) & 0xFFF;
            let mut arg = word & 0xFFFF;
            let argall = word & 0xFFFF_FFFF;
            let arg_hi = (word >> 16) & 0xFFFF;
            let delta_t = (word >> 24) & 0xFF;
            let mut retval = (word >> 16) & 0xFF;

            // Skip mostly-ones filler, but keep an FFF return of the 32-bit
            // scheduler at other timestamps.
            if t == 0xFFFFF && n == 0xFFF {
                continue;
            }

            // Sign extend the optimized retval [-128..127] from 8 to 16 bits.
            if retval & 0x80 != 0 {
                retval |= 0xFF00;
            }

            if self.opts.verbose {
                println!(
                    "% [{},{}] {:05x} {:03x} {:04x} {:04x} = {} {} {}, {} {} {:02x}",
                    blocknumber,
                    entry_i,
                    t,
                    n,
                    arg_hi,
                    word & 0xFFFF,
                    t,
                    n,
                    delta_t,
                    retval,
                    arg,
                    ipc
                );
            }

            if events::is_mark(n) {
                self.stats.total_marks += 1;
            } else {
                self.stats.events_by_type[(n >> 8) as usize] += 1;
            }

            let mut event = n;

            // A TSDELTA entry adjusts reconstruction state and emits
            // nothing. Small arguments advance time; huge ones are
            // sign-extended backward steps recorded when an interrupt made
            // time appear to run slightly backward.
            if n == events::TSDELTA {
                let oldfull = prepend | prior_t;
                let newfull = if argall < LARGE_TSDELTA {
                    oldfull.wrapping_add(argall)
                } else {
                    oldfull.wrapping_add(0xFFFF_FFFF_0000_0000 | argall)
                };
                prepend = newfull & !0xFFFFF;
                prior_t = newfull & 0xFFFFF;
                continue;
            }
            // The truncated time rolled over unless this is just a late
            // store of an entry captured before its neighbors.
            if wrapped(prior_t, t) && !late_store(prior_t, t) {
                prepend = prepend.wrapping_add(0x100000);
            }

            // Full cycle count since the base minute for this trace.
            let tfull = prepend | t;
            prior_t = t;

            let mut nsec10 = params.cycles_to_nsec10(tfull);
            let mut duration = 0u64;

            if events::has_rpcid(n) {
                has_arg = true;
                // Working on this RPC until one arrives with arg 0; the
                // switch to zero happens after the event is emitted.
                if arg != 0 {
                    self.cpus[cpu_idx].current_rpc = arg;
                } else {
                    deferred_rpcid0 = true;
                }
            }

            if events::is_namedef(n) {
                let len = ((n >> 4) & 0xF) as usize;
                if !(1..=8).contains(&len) {
                    continue;
                }
                if !events::is_timepair(n) {
                    // Payload is NUL-padded ASCII in the following words.
                    let avail = (WORDS_PER_BLOCK - i).min(len - 1);
                    let mut raw = Vec::with_capacity(avail * 8);
                    for payload in &words[i..i + avail] {
                        raw.extend_from_slice(&payload.to_le_bytes());
                    }
                    let mut tempname = names::cstring_field(&raw);

                    // Remap the raw numbering into unique name-table ranges.
                    let nameinsert = if events::is_pidnamedef(n) {
                        let mut pid = arg;
                        self.idle_pids.fixup(&mut pid, &mut tempname);
                        events::pid_to_event(pid)
                    } else if events::is_locknamedef(n) {
                        arg | 0x20000
                    } else if events::is_methodnamedef(n) {
                        (arg & 0xFFFF) | 0x30000
                    } else if events::is_kernelnamedef(n) {
                        arg | 0x40000
                    } else if events::is_modelnamedef(n) {
                        arg | 0x50000
                    } else if events::is_hostnamedef(n) {
                        arg | 0x60000
                    } else if events::is_queuenamedef(n) {
                        arg | 0x70000
                    } else if events::is_resnamedef(n) {
                        arg | 0x80000
                    } else {
                        // Syscall/IRQ/trap names keep their subtype nibble.
                        ((n & 0x00F) << 8) | arg
                    };

                    let name =
                        names::make_safe_ascii(&names::reduce_spaces(&tempname));
                    if !name.is_empty() {
                        self.names.insert(nameinsert, name.clone());
                        w.name(nsec10, n, argall as u32, &name)?;
                    }
                    // These event numbers vary across kernel versions, so
                    // learn them from the names in the trace itself.
                    if tempname.starts_with("local_timer") {
                        self.timer_irq_event = events::IRQ | (arg & 0xFFFF);
                    }
                    if tempname.starts_with("-sched-") {
                        self.sched_event =
                            events::SYSCALL64 | events::map_nr(arg & 0xFFFF);
                    }
                }
                i = entry_i + len;
                continue;
            }

            if events::is_cpu_description(n) {
                // Pass the network speed description through verbatim.
                w.event(nsec10, 1, event, current_cpu, 0, 0, argall, 0, 0, "")?;
            }

            if keep_just_names {
                continue;
            }

            // Name definitions skipped this code, so they do not affect
            // the lo/hi bounds.
            if self.stats.lo_timestamp > nsec10 {
                self.stats.lo_timestamp = nsec10;
            }
            if self.stats.hi_timestamp < nsec10 {
                self.stats.hi_timestamp = nsec10;
            }

            if events::is_contextswitch(n) {
                has_arg = true;
                arg = self.idle_pids.remap(arg);
                self.stats.unique_pids.insert(arg);
                if self.cpus[cpu_idx].current_pid != arg {
                    self.stats.ctx_switches += 1;
                }
                self.cpus[cpu_idx].current_pid = arg;
            }

            let mut name = String::new();
            if events::is_return(n) {
                let call_event = event & !0x200;
                if let Some(call_name) = self.names.get(call_event) {
                    name.push('/');
                    name.push_str(call_name);
                }
            } else if let Some(event_name) = self.names.get(event) {
                name.push_str(event_name);
            }

            if events::is_contextswitch(n) {
                if let Some(target) = self.names.get(events::pid_to_event(arg)) {
                    name.push_str(target);
                }
                name = names::append_num(&name, arg);
            }

            // An optimized call carries its return: duration in delta_t
            // counts and the return value in retval. The ipc byte holds two
            // 4-bit values, before-call IPC and within-call IPC.
            if events::is_opt_call(n, delta_t) {
                has_arg = true;
                duration = params
                    .cycles_to_nsec10(tfull + delta_t)
                    .wrapping_sub(nsec10);
                if params.low_res && delta_t == 1 {
                    duration = DEFAULT_LOW_RES_NSEC10;
                }
                if duration == 0 {
                    duration = 1;
                }
            } else {
                retval = 0;
            }

            // Remember the timer interrupt start, for the PC sample fixup.
            if n == self.timer_irq_event {
                self.cpus[cpu_idx].prior_timer_irq_nsec10 = nsec10;
            }

            if events::is_pc_sample(n) {
                has_arg = true;
                extra_word = true;
                let freq_mhz = arg;
                if i >= WORDS_PER_BLOCK {
                    break;
                }
                let pc_sample = words[i];
                i += 1;
                // Bit 63 says whether the sampled PC was kernel or user.
                n = if pc_sample & 0x8000_0000_0000_0000 != 0 {
                    events::PC_K
                } else {
                    events::PC_U
                };
                event = n;

                // The sample is taken after the local timer interrupt, but
                // belongs just before it.
                if self.cpus[cpu_idx].prior_timer_irq_nsec10 != 0 {
                    nsec10 = self.cpus[cpu_idx].prior_timer_irq_nsec10 - 1;
                }
                // A hash of the PC for quick display coloring.
                arg = (pc_sample >> 6) & 0xFFFF;
                retval = 0;
                ipc = 0;
                name = format!("PC={:012x}", pc_sample);

                // The entry may also carry a frequency sample; emit it as
                // its own event first.
                if freq_mhz > 0 {
                    w.event(
                        nsec10,
                        1,
                        events::PSTATE,
                        current_cpu,
                        self.cpus[cpu_idx].current_pid,
                        self.cpus[cpu_idx].current_rpc,
                        freq_mhz,
                        0,
                        0,
                        "-freq-",
                    )?;
                    self.stats.event_count += 1;
                }
            }

            if events::is_special(n) {
                has_arg = true;
                name.push_str(events::SPECIAL_NAMES[(n & 0x1F) as usize]);
                if events::has_rpcid(n) {
                    name = names::append_num(&self.names.lookup(arg | 0x30000), arg);
                } else if events::is_lock(n) {
                    name = format!(
                        "{}{}",
                        events::SPECIAL_NAMES[(n & 0x1F) as usize],
                        self.names.lookup(arg | 0x20000)
                    );
                } else if events::is_raw_pkt_hash(n) || events::is_user_msg_hash(n) {
                    // The display keys on this 16-bit fold of the hash.
                    let hash16 = ((argall >> 16) ^ argall) & 0xFFFF;
                    name = names::append_hex_num(&name, hash16);
                } else if n == events::RUNNABLE {
                    // Include which PID is being made runnable.
                    name = names::append_num(&name, arg);
                }
                if duration == 0 {
                    duration = 1;
                }
            }

            // An unoptimized return keeps its value in arg; move it.
            if events::is_return(n) {
                has_arg = true;
                retval = arg;
                arg = 0;
            }

            if events::is_bottom_half(n) {
                has_arg = true;
                name.push(':');
                name.push_str(events::SOFT_IRQ_NAMES[(arg & 0xF) as usize]);
            }

            // Packet and message hash events retain all 32 bits in output;
            // so does an RPC message-processing start.
            if events::is_raw_pkt_hash(n) || events::is_user_msg_hash(n) {
                arg = argall;
            }
            if events::is_rpc_msg(n) && arg != 0 {
                arg = argall;
            }

            // mark_a/b/c carry six base-40 chars; mark_d is numeric.
            if events::is_mark_abc(n) {
                has_arg = true;
                arg = argall;
                name.push('=');
                name.push_str(&names::base40_to_string(arg));
            }

            if self.opts.hexevent {
                w.fragment(&format!(
                    "{:05x}.{:03x} ",
                    (word >> 44) & 0xFFFFF,
                    (word >> 32) & 0xFFF
                ))?;
                if has_arg {
                    w.fragment(&format!(
                        " {:04x}{:04x} ",
                        (word >> 16) & 0xFFFF,
                        word & 0xFFFF
                    ))?;
                } else {
                    w.fragment("          ")?;
                }
            }

            // Events with no name in the first 4K numbers get a synthetic
            // one from the range prefix. A nameless syscall/ret 511 is an
            // old trace's -sched- with a newer name set; patch it here.
            if name.is_empty() && event <= 0xFFF {
                let nummask: u64 = if event >= 0x800 { 0x1FF } else { 0x0FF };
                name = format!(
                    "{}{}",
                    events::MISSING_EVENT_NAMES[(event >> 8) as usize],
                    event & nummask
                );
                match event {
                    0x9FF | 0xDFF => name = "-sched-".to_string(),
                    0xBFF | 0xFFF => name = "/-sched-".to_string(),
                    _ => {}
                }
            }

            w.event(
                nsec10,
                duration,
                event,
                current_cpu,
                self.cpus[cpu_idx].current_pid,
                self.cpus[cpu_idx].current_rpc,
                arg,
                retval,
                ipc,
                &name,
            )?;
            self.stats.event_count += 1;

            if self.opts.hexevent && extra_word {
                w.fragment(&format!("   {:16x}\n", words[entry_i + 1]))?;
            }

            if deferred_rpcid0 {
                self.cpus[cpu_idx].current_rpc = 0;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retval_sign_extension() {
        // Explicit bit-7 test, mirroring the decode path.
        let extend = |raw: u64| -> u64 {
            let mut r = raw & 0xFF;
            if r & 0x80 != 0 {
                r |= 0xFF00;
            }
            r
        };
        assert_eq!(extend(0x00), 0x0000);
        assert_eq!(extend(0x7F), 0x007F);
        assert_eq!(extend(0x80), 0xFF80);
        assert_eq!(extend(0xFF), 0xFFFF);
    }

    #[test]
    fn cpu_state_starts_at_first_block() {
        let decoder = Decoder::new(DecodeOptions::default());
        assert!(decoder.cpus.iter().all(|c| c.at_first_block));
        assert_eq!(decoder.timer_irq_event, events::DEFAULT_TIMER_IRQ_EVENT);
        assert_eq!(decoder.sched_event, events::DEFAULT_SCHED_EVENT);
    }
}
