//! LCP option negotiation - RFC 1661 section 6
//!
//! Negotiates MRU, the async control character map, magic numbers and the
//! protocol/address-control field compressions, and answers echo traffic
//! once the link is open.

use tracing::{debug, warn};

use crate::protocol::cp::{codes, encode_option, lcp_options, CpBuilder, OptionIterator};
use crate::protocol::ppp::protocols;

use super::{ControlProtocol, FsmAction, ReqJudgement, State};

/// Default MRU when nothing is negotiated.
pub const DEFAULT_MRU: u16 = 1500;

/// Smallest MRU we will agree to send with.
const MIN_MRU: u16 = 128;

/// Local LCP policy from configuration.
#[derive(Debug, Clone)]
pub struct LcpConfig {
    /// MRU to request (what we are willing to receive)
    pub mru: u16,
    /// Control characters that must be escaped towards us
    pub accm: u32,
    /// Offer protocol field compression
    pub pfc: bool,
    /// Offer address/control field compression
    pub acfc: bool,
}

impl Default for LcpConfig {
    fn default() -> Self {
        Self {
            mru: DEFAULT_MRU,
            accm: 0,
            pfc: false,
            acfc: false,
        }
    }
}

/// What each side agreed to, applied to the codec on layer-up.
#[derive(Debug, Clone, Copy, Default)]
pub struct LcpNegotiated {
    /// Largest frame the peer will accept
    pub peer_mru: u16,
    /// Characters the peer requires escaped (transmit map)
    pub tx_accm: u32,
    /// Peer accepts a compressed protocol field
    pub tx_pfc: bool,
    /// Peer accepts compressed address/control
    pub tx_acfc: bool,
    /// We accept compressed address/control
    pub rx_acfc: bool,
}

/// Options we are currently asking for, trimmed by Nak/Reject.
#[derive(Debug, Clone)]
struct Wants {
    mru: Option<u16>,
    accm: Option<u32>,
    magic: Option<u32>,
    pfc: bool,
    acfc: bool,
}

/// LCP protocol behavior plugged into the FSM engine.
#[derive(Debug)]
pub struct LcpLayer {
    cfg: LcpConfig,
    want: Wants,
    negotiated: LcpNegotiated,
    /// Magic number the peer asked for
    peer_magic: u32,
    /// Identifier for our own echo requests
    echo_id: u8,
}

fn pseudo_random() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u32;
    seed.wrapping_mul(1664525).wrapping_add(1013904223)
}

impl LcpLayer {
    /// Create the layer with local policy.
    pub fn new(cfg: LcpConfig) -> Self {
        let mut layer = Self {
            cfg,
            want: Wants {
                mru: None,
                accm: None,
                magic: None,
                pfc: false,
                acfc: false,
            },
            negotiated: LcpNegotiated::default(),
            peer_magic: 0,
            echo_id: 0,
        };
        layer.restart();
        layer
    }

    /// Negotiated results, valid once the FSM reports LayerUp.
    pub fn negotiated(&self) -> LcpNegotiated {
        self.negotiated
    }

    /// Magic number we are requesting.
    pub fn magic(&self) -> u32 {
        self.want.magic.unwrap_or(0)
    }

    /// Build an Echo-Request carrying our magic number.
    pub fn build_echo_request(&mut self) -> Vec<u8> {
        self.echo_id = self.echo_id.wrapping_add(1);
        CpBuilder::new(codes::ECHO_REQUEST, self.echo_id)
            .raw_data(&self.magic().to_be_bytes())
            .build()
    }

}

impl ControlProtocol for LcpLayer {
    fn name(&self) -> &'static str {
        "lcp"
    }

    fn protocol(&self) -> u16 {
        protocols::LCP
    }

    fn max_code(&self) -> u8 {
        codes::DISCARD_REQUEST
    }

    fn restart(&mut self) {
        self.want = Wants {
            mru: (self.cfg.mru != DEFAULT_MRU).then_some(self.cfg.mru),
            accm: Some(self.cfg.accm),
            magic: Some(pseudo_random()),
            pfc: self.cfg.pfc,
            acfc: self.cfg.acfc,
        };
        self.negotiated = LcpNegotiated {
            peer_mru: DEFAULT_MRU,
            tx_accm: 0xffff_ffff,
            ..LcpNegotiated::default()
        };
        self.peer_magic = 0;
    }

    fn build_request(&mut self) -> Vec<u8> {
        let mut options = Vec::new();
        if let Some(mru) = self.want.mru {
            options.extend(encode_option(lcp_options::MRU, &mru.to_be_bytes()));
        }
        if let Some(accm) = self.want.accm {
            options.extend(encode_option(lcp_options::ACCM, &accm.to_be_bytes()));
        }
        if let Some(magic) = self.want.magic {
            options.extend(encode_option(lcp_options::MAGIC_NUMBER, &magic.to_be_bytes()));
        }
        if self.want.pfc {
            options.extend(encode_option(lcp_options::PFC, &[]));
        }
        if self.want.acfc {
            options.extend(encode_option(lcp_options::ACFC, &[]));
        }
        options
    }

    fn judge_request(&mut self, options: &[u8]) -> ReqJudgement {
        let mut naks: Vec<u8> = Vec::new();
        let mut rejs: Vec<u8> = Vec::new();

        for opt in OptionIterator::new(options) {
            match opt.opt_type {
                lcp_options::MRU if opt.data.len() == 2 => {
                    let mru = u16::from_be_bytes([opt.data[0], opt.data[1]]);
                    if mru < MIN_MRU {
                        naks.extend(encode_option(lcp_options::MRU, &MIN_MRU.to_be_bytes()));
                    } else {
                        self.negotiated.peer_mru = mru;
                    }
                }
                lcp_options::ACCM if opt.data.len() == 4 => {
                    let accm =
                        u32::from_be_bytes([opt.data[0], opt.data[1], opt.data[2], opt.data[3]]);
                    self.negotiated.tx_accm = accm;
                }
                lcp_options::MAGIC_NUMBER if opt.data.len() == 4 => {
                    let magic =
                        u32::from_be_bytes([opt.data[0], opt.data[1], opt.data[2], opt.data[3]]);
                    if Some(magic) == self.want.magic {
                        // Same magic on both ends smells like a looped line.
                        warn!("peer proposed our own magic number, suspecting loopback");
                        naks.extend(encode_option(
                            lcp_options::MAGIC_NUMBER,
                            &pseudo_random().to_be_bytes(),
                        ));
                    } else {
                        self.peer_magic = magic;
                    }
                }
                lcp_options::PFC if opt.data.is_empty() => {
                    if self.cfg.pfc {
                        self.negotiated.tx_pfc = true;
                    } else {
                        rejs.extend_from_slice(&opt.to_bytes());
                    }
                }
                lcp_options::ACFC if opt.data.is_empty() => {
                    if self.cfg.acfc {
                        self.negotiated.tx_acfc = true;
                    } else {
                        rejs.extend_from_slice(&opt.to_bytes());
                    }
                }
                _ => {
                    debug!(opt_type = opt.opt_type, "rejecting LCP option");
                    rejs.extend_from_slice(&opt.to_bytes());
                }
            }
        }

        if !rejs.is_empty() {
            ReqJudgement::Rej(rejs)
        } else if !naks.is_empty() {
            ReqJudgement::Nak(naks)
        } else {
            ReqJudgement::Ack
        }
    }

    fn ack_received(&mut self, _options: &[u8]) {
        // Peer accepted our receive-side wants.
        self.negotiated.rx_acfc = self.want.acfc;
    }

    fn nak_received(&mut self, options: &[u8]) {
        for opt in OptionIterator::new(options) {
            match opt.opt_type {
                lcp_options::MRU if opt.data.len() == 2 => {
                    let suggested = u16::from_be_bytes([opt.data[0], opt.data[1]]);
                    self.want.mru = Some(suggested.min(self.cfg.mru).max(MIN_MRU));
                }
                lcp_options::ACCM if opt.data.len() == 4 => {
                    // Take the union: escaping more than asked is harmless.
                    let suggested =
                        u32::from_be_bytes([opt.data[0], opt.data[1], opt.data[2], opt.data[3]]);
                    self.want.accm = Some(self.want.accm.unwrap_or(0) | suggested);
                }
                lcp_options::MAGIC_NUMBER => {
                    self.want.magic = Some(pseudo_random());
                }
                lcp_options::PFC => self.want.pfc = false,
                lcp_options::ACFC => self.want.acfc = false,
                _ => {}
            }
        }
    }

    fn rej_received(&mut self, options: &[u8]) {
        for opt in OptionIterator::new(options) {
            match opt.opt_type {
                lcp_options::MRU => self.want.mru = None,
                lcp_options::ACCM => self.want.accm = None,
                lcp_options::MAGIC_NUMBER => self.want.magic = None,
                lcp_options::PFC => self.want.pfc = false,
                lcp_options::ACFC => self.want.acfc = false,
                _ => {}
            }
        }
    }

    fn extra_code(
        &mut self,
        code: u8,
        id: u8,
        data: &[u8],
        state: State,
        out: &mut Vec<FsmAction>,
    ) -> bool {
        match code {
            codes::ECHO_REQUEST => {
                if state != State::Opened {
                    debug!("echo request outside Opened discarded");
                    return true;
                }
                if data.len() >= 4 {
                    let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                    if self.peer_magic != 0 && magic != self.peer_magic {
                        warn!(magic, expected = self.peer_magic, "echo magic mismatch");
                    }
                }
                let reply = CpBuilder::new(codes::ECHO_REPLY, id)
                    .raw_data(&self.magic().to_be_bytes())
                    .build();
                out.push(FsmAction::SendPacket(reply));
                true
            }
            codes::ECHO_REPLY | codes::DISCARD_REQUEST => true,
            codes::PROTOCOL_REJECT => {
                // The link layer inspects protocol rejects itself; nothing
                // for the option machinery to do.
                true
            }
            _ => false,
        }
    }
}
