//! Event-code constants and range predicates for the 12-bit trace event
//! numbers, plus the fixed name tables used when enriching events.
//!
//! Event numbers partition by range: 0x010-0x1FF are variable-length name
//! definitions, 0x200-0x2FF are point events ("specials"), and 0x400-0xFFF
//! are trap/IRQ/syscall call and return ranges distinguished by bit 0x200.

/// Variable-length name entries, low nibble is the subtype.
pub const FILENAME: u64 = 0x001;
pub const PIDNAME: u64 = 0x002;
pub const METHODNAME: u64 = 0x003;
pub const TRAPNAME: u64 = 0x004;
pub const INTERRUPTNAME: u64 = 0x005;
pub const TIMEPAIR: u64 = 0x006;
pub const LOCKNAME: u64 = 0x007;
pub const SYSCALL64NAME: u64 = 0x008;
pub const KERNEL_VER: u64 = 0x009;
pub const MODEL_NAME: u64 = 0x00A;
pub const HOST_NAME: u64 = 0x00B;
pub const QUEUE_NAME: u64 = 0x00C;
pub const RES_NAME: u64 = 0x00D;

/// Point events.
pub const USERPID: u64 = 0x200;
pub const RPCIDREQ: u64 = 0x201;
pub const RPCIDRESP: u64 = 0x202;
pub const RPCIDMID: u64 = 0x203;
pub const RPCIDRXMSG: u64 = 0x204;
pub const RPCIDTXMSG: u64 = 0x205;
pub const RUNNABLE: u64 = 0x206;
pub const IPI: u64 = 0x207;
pub const MWAIT: u64 = 0x208;
pub const PSTATE: u64 = 0x209;
pub const MARKA: u64 = 0x20A;
pub const MARKB: u64 = 0x20B;
pub const MARKC: u64 = 0x20C;
pub const MARKD: u64 = 0x20D;
pub const LOCKNOACQUIRE: u64 = 0x210;
pub const LOCKACQUIRE: u64 = 0x211;
pub const LOCKWAKEUP: u64 = 0x212;
pub const RX_PKT: u64 = 0x214;
pub const TX_PKT: u64 = 0x215;
pub const RX_USER: u64 = 0x216;
pub const TX_USER: u64 = 0x217;
pub const MBIT_SEC: u64 = 0x218;
pub const PC_U: u64 = 0x219;
pub const PC_K: u64 = 0x21A;
pub const TSDELTA: u64 = 0x21D;
pub const MAX_SPECIAL: u64 = 0x2FF;

/// Two-word PC sample scaffolding entry; lives in the name range but is not
/// a name definition.
pub const PC_TEMP: u64 = 0x101;

/// Call/return range bases. Bit 0x200 distinguishes return from call.
pub const TRAP: u64 = 0x400;
pub const IRQ: u64 = 0x500;
pub const TRAPRET: u64 = 0x600;
pub const IRQRET: u64 = 0x700;
pub const SYSCALL64: u64 = 0x800;
pub const SYSRET64: u64 = 0xA00;
pub const SYSCALL32: u64 = 0xC00;
pub const SYSRET32: u64 = 0xE00;

/// IRQ vector reserved for bottom-half (softirq) execution.
pub const BOTTOM_HALF: u64 = 255;

/// Defaults until the trace's own name entries teach us the real numbers.
pub const DEFAULT_TIMER_IRQ_EVENT: u64 = IRQ | 0xEC;
pub const DEFAULT_SCHED_EVENT: u64 = SYSCALL64 | 0x1FF;

/// Names for specials 0x200-0x21F, indexed by `event & 0x1F`.
pub const SPECIAL_NAMES: [&str; 32] = [
    "userpid", "rpcidreq", "rpcidresp", "rpcidmid",
    "rpcidrxmsg", "rpcidtxmsg", "runnable", "sendipi",
    "mwait", "freq", "mark_a", "mark_b",
    "mark_c", "mark_d", "", "",
    "try_", "acq_", "rel_", "",
    "rx_pkt", "tx_pkt", "rx_user", "tx_user",
    "mbit_sec", "pc_u", "pc_k", "",
    "", "tsdelta", "", "",
];

/// Bottom-half handler names, indexed by `arg & 0xF`.
pub const SOFT_IRQ_NAMES: [&str; 16] = [
    "hi", "timer", "tx", "rx", "block", "irq_p", "taskl", "sched",
    "hrtim", "rcu", "", "", "", "", "", "ast",
];

/// Placeholder prefixes for events with no name entry, indexed by the high
/// nibble of the event number.
pub const MISSING_EVENT_NAMES: [&str; 16] = [
    "nam#", "nam#", "spl#", "spl#",
    "trp#", "irq#", "/trp#", "/irq#",
    "sys#", "sys#", "/sys#", "/sys#",
    "s32#", "s32#", "/s32#", "/s32#",
];

/// Remap high 32-bit syscall numbers 0x200-0x3FF up to 0x400-0x5FF so they
/// do not collide with the 64-bit syscall name space.
#[inline(always)]
pub const fn map_nr(nr: u64) -> u64 {
    nr + (nr & 0x200)
}

/// A user-mode-execution pseudo-event is the pid number plus 64K.
#[inline(always)]
pub const fn pid_to_event(pid: u64) -> u64 {
    (pid & 0xFFFF) | 0x10000
}

#[inline(always)]
pub const fn event_to_pid(event: u64) -> u64 {
    event & 0xFFFF
}

pub const fn is_cpu_description(event: u64) -> bool {
    event == MBIT_SEC
}

pub const fn is_contextswitch(event: u64) -> bool {
    event == USERPID
}

/// Syscall/interrupt/trap entry.
pub const fn is_call(event: u64) -> bool {
    event <= 0xFFFF && TRAP <= event && (event & 0x200) == 0
}

/// Optimized call with the matching return folded into the same entry.
pub const fn is_opt_call(event: u64, delta_t: u64) -> bool {
    delta_t > 0 && is_call(event)
}

/// Syscall/interrupt/trap return.
pub const fn is_return(event: u64) -> bool {
    event <= 0xFFFF && TRAP <= event && (event & 0x200) != 0
}

pub const fn is_timepair(event: u64) -> bool {
    (event & !0xF0) == TIMEPAIR
}

pub const fn is_namedef(event: u64) -> bool {
    0x010 <= event && event <= 0x1FF && event != PC_TEMP
}

pub const fn is_pidnamedef(event: u64) -> bool {
    (event & 0xF0F) == PIDNAME
}

pub const fn is_methodnamedef(event: u64) -> bool {
    (event & 0xF0F) == METHODNAME
}

pub const fn is_locknamedef(event: u64) -> bool {
    (event & 0xF0F) == LOCKNAME
}

pub const fn is_kernelnamedef(event: u64) -> bool {
    (event & 0xF0F) == KERNEL_VER
}

pub const fn is_modelnamedef(event: u64) -> bool {
    (event & 0xF0F) == MODEL_NAME
}

pub const fn is_hostnamedef(event: u64) -> bool {
    (event & 0xF0F) == HOST_NAME
}

pub const fn is_queuenamedef(event: u64) -> bool {
    (event & 0xF0F) == QUEUE_NAME
}

pub const fn is_resnamedef(event: u64) -> bool {
    (event & 0xF0F) == RES_NAME
}

/// Special point event, excluding the context switch itself.
pub const fn is_special(event: u64) -> bool {
    USERPID < event && event <= MAX_SPECIAL
}

pub const fn is_mark(event: u64) -> bool {
    MARKA <= event && event <= MARKD
}

pub const fn is_mark_abc(event: u64) -> bool {
    event == MARKA || event == MARKB || event == MARKC
}

pub const fn is_pc_sample(event: u64) -> bool {
    event == PC_U || event == PC_K || event == PC_TEMP
}

/// rpcreq, rpcresp, rpcmid, rpcrxmsg, rpctxmsg all carry an RPC id in arg.
pub const fn has_rpcid(event: u64) -> bool {
    RPCIDREQ <= event && event <= RPCIDTXMSG
}

/// Raw kernel packet receive/send time-and-hash.
pub const fn is_raw_pkt_hash(event: u64) -> bool {
    RX_PKT <= event && event <= TX_PKT
}

/// User message receive/send time-and-hash.
pub const fn is_user_msg_hash(event: u64) -> bool {
    RX_USER <= event && event <= TX_USER
}

/// RPC message processing begin/end.
pub const fn is_rpc_msg(event: u64) -> bool {
    RPCIDREQ <= event && event <= RPCIDRESP
}

pub const fn is_lock(event: u64) -> bool {
    LOCKNOACQUIRE <= event && event <= LOCKWAKEUP
}

/// IRQ call/return routed to the bottom-half (softirq) handler.
pub const fn is_bottom_half(event: u64) -> bool {
    (event & !0x200) == (IRQ + BOTTOM_HALF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_and_return_ranges() {
        assert!(is_call(TRAP));
        assert!(is_call(SYSCALL64 | 0x1FF));
        assert!(is_call(SYSCALL32 | 0x3F));
        assert!(!is_call(SYSRET64));
        assert!(is_return(SYSRET64));
        assert!(is_return(TRAPRET | 0x0E));
        assert!(!is_return(USERPID));
        // Below the trap range nothing is a call or return.
        assert!(!is_call(MARKA));
        assert!(!is_return(TSDELTA));
    }

    #[test]
    fn namedef_range_excludes_pc_temp() {
        assert!(is_namedef(0x010));
        assert!(is_namedef(0x1FF));
        assert!(!is_namedef(PC_TEMP));
        assert!(!is_namedef(0x00F));
        assert!(!is_namedef(USERPID));
        assert!(is_pidnamedef(0x022)); // len nibble does not matter
        assert!(is_locknamedef(0x047));
        assert!(is_timepair(0x036));
    }

    #[test]
    fn special_ranges() {
        assert!(!is_special(USERPID));
        assert!(is_special(MARKD));
        assert!(is_special(MBIT_SEC));
        assert!(!is_special(TRAP));
        assert!(is_mark_abc(MARKC));
        assert!(!is_mark_abc(MARKD));
        assert!(is_mark(MARKD));
        assert!(has_rpcid(RPCIDRXMSG));
        assert!(is_lock(LOCKACQUIRE));
    }

    #[test]
    fn bottom_half_matches_call_and_return() {
        assert!(is_bottom_half(IRQ | BOTTOM_HALF));
        assert!(is_bottom_half(IRQRET | BOTTOM_HALF));
        assert!(!is_bottom_half(IRQ | 0xEC));
    }

    #[test]
    fn map_nr_relocates_32bit_range() {
        assert_eq!(map_nr(0x1FF), 0x1FF);
        assert_eq!(map_nr(0x200), 0x400);
        assert_eq!(map_nr(0x23B), 0x43B);
    }

    #[test]
    fn pid_event_mapping() {
        assert_eq!(pid_to_event(0), 0x10000);
        assert_eq!(pid_to_event(1234), 0x10000 | 1234);
        assert_eq!(event_to_pid(pid_to_event(1234)), 1234);
    }
}
