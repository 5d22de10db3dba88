//! Line classification for simulator and testbed traces.
//!
//! Turns one raw trace line into at most one [`Event`]. Dispatch is a
//! substring table checked in priority order (first match wins); the matched
//! line is then parsed with the compiled patterns below. Unknown lines are
//! dropped silently, recognized lines with missing fields are reported as
//! [`ClassifyError::Malformed`] so the caller can warn and carry on.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::types::*;
use crate::config::LpmMapping;

/// Banner printed by the simulator logger; its absence means testbed framing
pub const SIMULATOR_BANNER: &str = "Starting COOJA logger";

/// Marker in an address field meaning "no address"
const NULL_MARKER: &str = "NULL";

/// Line families recognized by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinePattern {
    Association,
    LeavingNetwork,
    TimeSource,
    /// Per-frame link traffic, covered by the aggregate link statistics
    LinkTraffic,
    ParentChange,
    ParentLladdr,
    LeftNetwork,
    AppSent,
    AppReceived,
    LinkStats,
    Energest,
}

/// Substring markers in priority order
pub const PATTERN_TABLE: &[(&str, LinePattern)] = &[
    ("association done", LinePattern::Association),
    ("leaving the network", LinePattern::LeavingNetwork),
    ("update time source", LinePattern::TimeSource),
    ("sending to", LinePattern::LinkTraffic),
    ("send packet to", LinePattern::LinkTraffic),
    ("received packet from", LinePattern::LinkTraffic),
    ("received from", LinePattern::LinkTraffic),
    ("rpl_set_preferred_parent", LinePattern::ParentChange),
    (" parent switch: ", LinePattern::ParentChange),
    ("new parent lladdr", LinePattern::ParentLladdr),
    ("node has left the network", LinePattern::LeftNetwork),
    ("app generate packet", LinePattern::AppSent),
    ("app receive packet", LinePattern::AppReceived),
    ("num packets", LinePattern::LinkStats),
    ("INFO: Energest", LinePattern::Energest),
];

/// First entry of [`PATTERN_TABLE`] whose marker occurs in `message`
pub fn match_pattern(message: &str) -> Option<LinePattern> {
    PATTERN_TABLE
        .iter()
        .find(|(marker, _)| message.contains(marker))
        .map(|&(_, pattern)| pattern)
}

/// Compiled regex patterns for field extraction
pub struct LogPatterns {
    /// Match: "rpl_set_preferred_parent: used to be NULL, now is fe80::c30c:0:0:1"
    pub preferred_parent: Regex,
    /// Match: "parent switch: (NULL IP addr) -> fe80::244:44:44:44"
    pub parent_switch: Regex,
    /// Match: anything after " -> "
    pub arrow_target: Regex,
    /// Match: "app generate packet seqnum=1 node_id=4"
    pub app_sent: Regex,
    /// Match: "app receive packet seqnum=1 from=fd00::208:8:8:8"
    pub app_received: Regex,
    /// Match: "num packets: tx=0 ack=0 rx=0 queue_drops=0 to=0014.0014.0014.0014"
    pub link_stats: Regex,
    /// Match: "--- Period summary #2 (60 seconds)"
    pub energest_period: Regex,
    /// Match: "Total time  :   60000000"
    pub energest_total: Regex,
    /// Match: "Deep LPM    :          0/  60000000 (0 permil)"
    pub energest_component: Regex,
    /// Match: "Test ended at simulation time: 3600000000"
    pub test_ended: Regex,
}

impl LogPatterns {
    pub fn new() -> Self {
        Self {
            preferred_parent: Regex::new(
                r"rpl_set_preferred_parent: used to be (\S+), now is (\S+)"
            ).expect("Invalid preferred_parent regex"),
            parent_switch: Regex::new(
                r" parent switch: (.+?) -> (.+)$"
            ).expect("Invalid parent_switch regex"),
            arrow_target: Regex::new(
                r" -> (.+)$"
            ).expect("Invalid arrow_target regex"),
            app_sent: Regex::new(
                r"app generate packet seqnum=(\d+)(?: node_id=(\d+))?"
            ).expect("Invalid app_sent regex"),
            app_received: Regex::new(
                r"app receive packet seqnum=(\d+) from=(\S+)"
            ).expect("Invalid app_received regex"),
            link_stats: Regex::new(
                r"num packets: tx=(\d+) ack=(\d+) rx=(\d+) queue_drops=(\d+) to=(\S+)"
            ).expect("Invalid link_stats regex"),
            energest_period: Regex::new(
                r"Period summary #\d+ \((\d+) seconds?\)"
            ).expect("Invalid energest_period regex"),
            energest_total: Regex::new(
                r"Total time\s*:\s*(\d+)"
            ).expect("Invalid energest_total regex"),
            energest_component: Regex::new(
                r"(CPU|Deep LPM|LPM|Radio Tx|Radio Rx)\s*:\s*([^\s/]*)"
            ).expect("Invalid energest_component regex"),
            test_ended: Regex::new(
                r"Test ended at simulation time:?\s*(\d+)"
            ).expect("Invalid test_ended regex"),
        }
    }
}

impl Default for LogPatterns {
    fn default() -> Self {
        Self::new()
    }
}

/// Global patterns instance
pub static PATTERNS: LazyLock<LogPatterns> = LazyLock::new(LogPatterns::new);

/// A recognized line that lacks the fields its family requires
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("malformed {pattern:?} line ({reason}): {line}")]
    Malformed {
        pattern: LinePattern,
        reason: &'static str,
        line: String,
    },
}

/// Pick the framing of a whole trace from its content
pub fn detect_framing(content: &str) -> Framing {
    if content.contains(SIMULATOR_BANNER) {
        Framing::Simulator
    } else {
        Framing::Testbed
    }
}

/// `None` if the address text carries the NULL marker
pub fn extract_addr(s: &str) -> Option<String> {
    let s = s.trim();
    if s.contains(NULL_MARKER) {
        None
    } else {
        Some(s.to_string())
    }
}

/// Node id encoded in the last group of an IPv6 address ("fd00::208:8:8:8" -> 8)
pub fn addr_to_id(addr: &str) -> Option<NodeId> {
    let last = addr.rsplit(':').next()?;
    NodeId::from_str_radix(last, 16).ok()
}

/// Leading timestamp and node id stripped from a line
struct FramedLine<'a> {
    timestamp_ms: TimestampMs,
    node_id: NodeId,
    message: &'a str,
}

/// Split off the first whitespace-delimited token
fn split_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(idx) => Some((&s[..idx], s[idx..].trim_start())),
        None => Some((s, "")),
    }
}

fn capture_u64(caps: &Captures, idx: usize) -> Option<u64> {
    caps.get(idx)?.as_str().parse().ok()
}

/// Per-analysis line classifier.
///
/// Holds the only cross-line parsing state: the testbed time origin, the
/// testbed node-id to device-id table and the last framed timestamp. A fresh
/// classifier is created for every trace.
pub struct LineClassifier {
    framing: Framing,
    lpm_mapping: LpmMapping,
    testbed_start: Option<f64>,
    device_ids: HashMap<NodeId, NodeId>,
    last_timestamp_ms: Option<TimestampMs>,
    framed_node_id: Option<NodeId>,
}

impl LineClassifier {
    pub fn new(framing: Framing, lpm_mapping: LpmMapping) -> Self {
        Self {
            framing,
            lpm_mapping,
            testbed_start: None,
            device_ids: HashMap::new(),
            last_timestamp_ms: None,
            framed_node_id: None,
        }
    }

    /// Timestamp of the last line whose columns could be framed
    pub fn last_timestamp_ms(&self) -> Option<TimestampMs> {
        self.last_timestamp_ms
    }

    /// Node id of the line classified last, `None` if it could not be framed
    pub fn framed_node_id(&self) -> Option<NodeId> {
        self.framed_node_id
    }

    /// Testbed node id -> device id entries learned so far
    pub fn device_ids(&self) -> &HashMap<NodeId, NodeId> {
        &self.device_ids
    }

    /// Classify one line of the trace
    pub fn classify(&mut self, line: &str) -> Result<Option<Event>, ClassifyError> {
        let line = line.trim();
        self.framed_node_id = None;

        let Some(framed) = self.frame(line) else {
            // Failed to extract timestamp; the end-of-test line lands here
            return Ok(self.sim_ended(line));
        };
        self.last_timestamp_ms = Some(framed.timestamp_ms);
        self.framed_node_id = Some(framed.node_id);

        let Some(pattern) = match_pattern(framed.message) else {
            return Ok(None);
        };

        let malformed = |reason: &'static str| ClassifyError::Malformed {
            pattern,
            reason,
            line: line.to_string(),
        };

        let kind = match pattern {
            LinePattern::Association => EventKind::Associated,
            LinePattern::LeavingNetwork => EventKind::Left,
            LinePattern::TimeSource => {
                let caps = PATTERNS
                    .arrow_target
                    .captures(framed.message)
                    .ok_or_else(|| malformed("missing time source address"))?;
                EventKind::TimeSourceUpdated {
                    lladdr: extract_addr(&caps[1]),
                }
            }
            LinePattern::LinkTraffic => return Ok(None),
            LinePattern::ParentChange => {
                let caps = PATTERNS
                    .preferred_parent
                    .captures(framed.message)
                    .or_else(|| PATTERNS.parent_switch.captures(framed.message))
                    .ok_or_else(|| malformed("missing parent addresses"))?;
                EventKind::ParentChanged {
                    old: extract_addr(&caps[1]),
                    new: extract_addr(&caps[2]),
                }
            }
            LinePattern::ParentLladdr => {
                let caps = PATTERNS
                    .arrow_target
                    .captures(framed.message)
                    .ok_or_else(|| malformed("missing parent lladdr"))?;
                EventKind::ParentLladdrUpdated {
                    lladdr: extract_addr(&caps[1]),
                }
            }
            LinePattern::LeftNetwork => EventKind::LeftNetwork,
            LinePattern::AppSent => {
                let caps = PATTERNS
                    .app_sent
                    .captures(framed.message)
                    .ok_or_else(|| malformed("missing seqnum"))?;
                let seqnum = capture_u64(&caps, 1)
                    .and_then(|v| Seqnum::try_from(v).ok())
                    .ok_or_else(|| malformed("seqnum out of range"))?;
                if self.framing == Framing::Testbed {
                    let node_id = capture_u64(&caps, 2)
                        .and_then(|v| NodeId::try_from(v).ok())
                        .ok_or_else(|| malformed("missing node_id"))?;
                    self.device_ids.insert(node_id, framed.node_id);
                }
                EventKind::PacketSent { seqnum }
            }
            LinePattern::AppReceived => {
                let caps = PATTERNS
                    .app_received
                    .captures(framed.message)
                    .ok_or_else(|| malformed("missing seqnum or sender"))?;
                let seqnum = capture_u64(&caps, 1)
                    .and_then(|v| Seqnum::try_from(v).ok())
                    .ok_or_else(|| malformed("seqnum out of range"))?;
                let mut from_node =
                    addr_to_id(&caps[2]).ok_or_else(|| malformed("sender address"))?;
                if self.framing == Framing::Testbed {
                    from_node = self.device_ids.get(&from_node).copied().unwrap_or(0);
                }
                EventKind::PacketReceived { seqnum, from_node }
            }
            LinePattern::LinkStats => {
                let caps = PATTERNS
                    .link_stats
                    .captures(framed.message)
                    .ok_or_else(|| malformed("missing link counters"))?;
                let counter = |idx| capture_u64(&caps, idx).ok_or_else(|| malformed("counter out of range"));
                EventKind::LinkStats {
                    tx: counter(1)?,
                    ack: counter(2)?,
                    rx: counter(3)?,
                    queue_drops: counter(4)?,
                    to_addr: caps[5].to_string(),
                }
            }
            LinePattern::Energest => match self.classify_energest(framed.message) {
                Some(Ok(kind)) => kind,
                Some(Err(reason)) => return Err(malformed(reason)),
                None => return Ok(None),
            },
        };

        Ok(Some(Event {
            timestamp_ms: framed.timestamp_ms,
            node_id: framed.node_id,
            kind,
            raw: framed.message.to_string(),
        }))
    }

    /// Energest sub-labels; `None` for labels that carry no accumulator
    fn classify_energest(&self, message: &str) -> Option<Result<EventKind, &'static str>> {
        if message.contains("Period") {
            return Some(
                PATTERNS
                    .energest_period
                    .captures(message)
                    .and_then(|caps| capture_u64(&caps, 1))
                    .map(|seconds| EventKind::EnergestPeriod { seconds })
                    .ok_or("missing period length"),
            );
        }
        if message.contains("Total time") {
            return Some(
                PATTERNS
                    .energest_total
                    .captures(message)
                    .and_then(|caps| capture_u64(&caps, 1))
                    .map(|ticks| EventKind::EnergestTotal { ticks })
                    .ok_or("missing total ticks"),
            );
        }

        let caps = PATTERNS.energest_component.captures(message)?;
        let component = match (&caps[1], self.lpm_mapping) {
            ("CPU", _) => EnergestComponent::CpuOn,
            ("LPM", LpmMapping::LpmIsDeepSleep) => EnergestComponent::CpuDeepSleep,
            ("LPM", LpmMapping::LpmIsSleep) => EnergestComponent::CpuSleep,
            ("Deep LPM", LpmMapping::LpmIsDeepSleep) => EnergestComponent::CpuSleep,
            ("Deep LPM", LpmMapping::LpmIsSleep) => EnergestComponent::CpuDeepSleep,
            ("Radio Tx", _) => EnergestComponent::RadioTx,
            _ => EnergestComponent::RadioRx,
        };
        Some(
            capture_u64(&caps, 2)
                .map(|ticks| EventKind::EnergestComponent { component, ticks })
                .ok_or("missing component ticks"),
        )
    }

    /// Extract the leading timestamp (normalized to ms) and node id
    fn frame<'a>(&mut self, line: &'a str) -> Option<FramedLine<'a>> {
        match self.framing {
            Framing::Simulator => {
                let (ts, rest) = split_token(line)?;
                let (node, message) = split_token(rest)?;
                let ts: i64 = ts.parse().ok()?;
                let node_id: NodeId = node.parse().ok()?;
                Some(FramedLine {
                    timestamp_ms: ts.div_euclid(1000),
                    node_id,
                    message,
                })
            }
            Framing::Testbed => {
                let mut columns = line.splitn(3, ';');
                let ts: f64 = columns.next()?.trim().parse().ok()?;
                if !ts.is_finite() {
                    return None;
                }
                let start = *self.testbed_start.get_or_insert(ts);
                let tag = columns.next()?.trim();
                let message = columns.next()?.trim();
                let node_id: NodeId = tag.get(3..)?.parse().ok()?;
                Some(FramedLine {
                    timestamp_ms: ((ts - start) * 1000.0) as TimestampMs,
                    node_id,
                    message,
                })
            }
        }
    }

    /// "Test ended at simulation time: 3600000000" (simulation time in µs)
    fn sim_ended(&self, line: &str) -> Option<Event> {
        if !line.contains("Test ended") {
            return None;
        }
        let sim_time = PATTERNS
            .test_ended
            .captures(line)
            .and_then(|caps| caps[1].parse::<i64>().ok())
            .or_else(|| line.split_whitespace().nth(5)?.parse().ok())?;
        let sim_time_ms = sim_time / 1000;
        Some(Event {
            timestamp_ms: sim_time_ms,
            node_id: 0,
            kind: EventKind::SimEnded { sim_time_ms },
            raw: line.to_string(),
        })
    }
}
