//! CCP algorithm negotiation - RFC 1962
//!
//! Each Configure-Request advertises the algorithms the sender can
//! receive; the responder keeps at most one and rejects the rest, so each
//! direction converges on a single compressor. The Reset-Request/Ack
//! exchange re-synchronizes dictionaries after a decompression failure.

use tracing::{debug, warn};

use crate::compress::{judge_option, option_data, AlgorithmKind, CompressConfig};
use crate::protocol::cp::{ccp_options, codes, encode_option, CpBuilder, OptionIterator};
use crate::protocol::ppp::protocols;

use super::{ControlProtocol, FsmAction, ReqJudgement, State};

/// Local CCP policy from configuration.
#[derive(Debug, Clone)]
pub struct CcpConfig {
    /// Algorithms we are willing to use, most preferred first
    pub algorithms: Vec<AlgorithmKind>,
    /// Parameters for our side of the negotiation
    pub compress: CompressConfig,
}

impl Default for CcpConfig {
    fn default() -> Self {
        Self {
            algorithms: vec![AlgorithmKind::Deflate, AlgorithmKind::Predictor1],
            compress: CompressConfig::default(),
        }
    }
}

/// Dictionary-reset notifications for the link to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcpEvent {
    /// Peer sent Reset-Request: reset the transmit compressor
    ResetEncoder,
    /// Peer acknowledged our Reset-Request: reset the receive decompressor
    ResetDecoder,
}

fn kind_of(opt_type: u8) -> Option<AlgorithmKind> {
    match opt_type {
        ccp_options::PREDICTOR1 => Some(AlgorithmKind::Predictor1),
        ccp_options::DEFLATE => Some(AlgorithmKind::Deflate),
        _ => None,
    }
}

/// CCP protocol behavior plugged into the FSM engine.
#[derive(Debug)]
pub struct CcpLayer {
    cfg: CcpConfig,
    /// Receive-side algorithms still on offer, trimmed by Nak/Reject
    offer: Vec<AlgorithmKind>,
    /// Current parameters for our offered Deflate option
    deflate_window: u8,
    /// Chosen by the peer's ack of our request (our receive side)
    decoder_choice: Option<(AlgorithmKind, Vec<u8>)>,
    /// Chosen by our ack of the peer's request (our transmit side)
    encoder_choice: Option<(AlgorithmKind, Vec<u8>)>,
    events: Vec<CcpEvent>,
}

impl CcpLayer {
    /// Create the layer with local policy.
    pub fn new(cfg: CcpConfig) -> Self {
        let mut layer = Self {
            deflate_window: cfg.compress.deflate_window,
            offer: Vec::new(),
            decoder_choice: None,
            encoder_choice: None,
            events: Vec::new(),
            cfg,
        };
        layer.restart();
        layer
    }

    /// Algorithm and option data for the receive side, once negotiated.
    pub fn decoder_choice(&self) -> Option<&(AlgorithmKind, Vec<u8>)> {
        self.decoder_choice.as_ref()
    }

    /// Algorithm and option data for the transmit side, once negotiated.
    pub fn encoder_choice(&self) -> Option<&(AlgorithmKind, Vec<u8>)> {
        self.encoder_choice.as_ref()
    }

    /// Drain pending reset notifications.
    pub fn take_events(&mut self) -> Vec<CcpEvent> {
        std::mem::take(&mut self.events)
    }

    fn our_option_data(&self, kind: AlgorithmKind) -> Vec<u8> {
        match kind {
            AlgorithmKind::Deflate => option_data(
                kind,
                &CompressConfig {
                    deflate_window: self.deflate_window,
                },
            ),
            _ => option_data(kind, &self.cfg.compress),
        }
    }
}

impl ControlProtocol for CcpLayer {
    fn name(&self) -> &'static str {
        "ccp"
    }

    fn protocol(&self) -> u16 {
        protocols::CCP
    }

    fn max_code(&self) -> u8 {
        codes::RESET_ACK
    }

    fn restart(&mut self) {
        self.offer = self.cfg.algorithms.clone();
        self.deflate_window = self.cfg.compress.deflate_window;
        self.decoder_choice = None;
        self.encoder_choice = None;
        self.events.clear();
    }

    fn build_request(&mut self) -> Vec<u8> {
        let mut options = Vec::new();
        for kind in &self.offer {
            options.extend(encode_option(
                kind.option_type(),
                &self.our_option_data(*kind),
            ));
        }
        options
    }

    fn judge_request(&mut self, options: &[u8]) -> ReqJudgement {
        let mut naks: Vec<u8> = Vec::new();
        let mut rejs: Vec<u8> = Vec::new();
        let mut chosen: Option<(AlgorithmKind, Vec<u8>)> = None;

        for opt in OptionIterator::new(options) {
            let kind = kind_of(opt.opt_type).filter(|k| self.cfg.algorithms.contains(k));
            let Some(kind) = kind else {
                debug!(opt_type = opt.opt_type, "rejecting CCP algorithm");
                rejs.extend_from_slice(&opt.to_bytes());
                continue;
            };
            if chosen.is_some() {
                // One algorithm per direction; shed the extras.
                rejs.extend_from_slice(&opt.to_bytes());
                continue;
            }
            match judge_option(kind, opt.data) {
                ReqJudgement::Ack => chosen = Some((kind, opt.data.to_vec())),
                ReqJudgement::Nak(replacement) => naks.extend_from_slice(&replacement),
                ReqJudgement::Rej(_) => rejs.extend_from_slice(&opt.to_bytes()),
            }
        }

        if !rejs.is_empty() {
            ReqJudgement::Rej(rejs)
        } else if !naks.is_empty() {
            ReqJudgement::Nak(naks)
        } else if let Some(choice) = chosen {
            self.encoder_choice = Some(choice);
            ReqJudgement::Ack
        } else {
            // An empty request negotiates no compression towards us.
            self.encoder_choice = None;
            ReqJudgement::Ack
        }
    }

    fn ack_received(&mut self, options: &[u8]) {
        // The peer accepted our offer list; the most preferred remaining
        // algorithm carries our receive side.
        self.decoder_choice = OptionIterator::new(options)
            .find_map(|opt| kind_of(opt.opt_type).map(|k| (k, opt.data.to_vec())));
    }

    fn nak_received(&mut self, options: &[u8]) {
        for opt in OptionIterator::new(options) {
            if kind_of(opt.opt_type) == Some(AlgorithmKind::Deflate) {
                let suggested = crate::compress::deflate::window_from_option(opt.data);
                self.deflate_window = suggested.min(self.cfg.compress.deflate_window);
            }
        }
    }

    fn rej_received(&mut self, options: &[u8]) {
        for opt in OptionIterator::new(options) {
            if let Some(kind) = kind_of(opt.opt_type) {
                self.offer.retain(|k| *k != kind);
            }
        }
        if self.offer.is_empty() {
            warn!("peer rejected every compression algorithm we can receive");
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
            codes::RESET_REQUEST => {
                if state == State::Opened {
                    debug!("peer requested compression reset");
                    self.events.push(CcpEvent::ResetEncoder);
                    let ack = CpBuilder::new(codes::RESET_ACK, id).raw_data(data).build();
                    out.push(FsmAction::SendPacket(ack));
                }
                true
            }
            codes::RESET_ACK => {
                if state == State::Opened {
                    self.events.push(CcpEvent::ResetDecoder);
                }
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::cp::CpPacket;

    fn options_of(list: &[u8]) -> Vec<(u8, Vec<u8>)> {
        OptionIterator::new(list)
            .map(|o| (o.opt_type, o.data.to_vec()))
            .collect()
    }

    #[test]
    fn test_request_offers_all_enabled() {
        let mut ccp = CcpLayer::new(CcpConfig::default());
        let req = ccp.build_request();
        let opts = options_of(&req);
        assert_eq!(opts.len(), 2);
        assert_eq!(opts[0].0, ccp_options::DEFLATE);
        assert_eq!(opts[0].1, vec![0x78, 0]);
        assert_eq!(opts[1].0, ccp_options::PREDICTOR1);
        assert!(opts[1].1.is_empty());
    }

    #[test]
    fn test_judge_keeps_first_acceptable_rejects_rest() {
        let mut ccp = CcpLayer::new(CcpConfig::default());
        let options = [
            encode_option(ccp_options::DEFLATE, &[0x78, 0]),
            encode_option(ccp_options::PREDICTOR1, &[]),
        ]
        .concat();

        match ccp.judge_request(&options) {
            ReqJudgement::Rej(rejs) => {
                let opts = options_of(&rejs);
                assert_eq!(opts.len(), 1);
                assert_eq!(opts[0].0, ccp_options::PREDICTOR1);
            }
            other => panic!("expected reject of the extra option, got {other:?}"),
        }

        // A single-option retry is clean.
        let retry = encode_option(ccp_options::DEFLATE, &[0x78, 0]);
        assert_eq!(ccp.judge_request(&retry), ReqJudgement::Ack);
        let (kind, data) = ccp.encoder_choice().unwrap();
        assert_eq!(*kind, AlgorithmKind::Deflate);
        assert_eq!(data, &vec![0x78, 0]);
    }

    #[test]
    fn test_judge_rejects_unknown_algorithm() {
        let mut ccp = CcpLayer::new(CcpConfig::default());
        let options = encode_option(ccp_options::BSD_COMPRESS, &[0x29]);
        assert!(matches!(ccp.judge_request(&options), ReqJudgement::Rej(_)));
    }

    #[test]
    fn test_judge_naks_oversized_deflate_window() {
        let mut ccp = CcpLayer::new(CcpConfig::default());
        // Window nibble beyond 15 after the +8 bias.
        let options = encode_option(ccp_options::DEFLATE, &[0x88, 0]);
        match ccp.judge_request(&options) {
            ReqJudgement::Nak(naks) => {
                let opts = options_of(&naks);
                assert_eq!(opts[0].1, vec![0x78, 0]);
            }
            other => panic!("expected nak, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_request_means_no_compression() {
        let mut ccp = CcpLayer::new(CcpConfig::default());
        assert_eq!(ccp.judge_request(&[]), ReqJudgement::Ack);
        assert!(ccp.encoder_choice().is_none());
    }

    #[test]
    fn test_ack_selects_decoder() {
        let mut ccp = CcpLayer::new(CcpConfig::default());
        let req = ccp.build_request();
        ccp.ack_received(&req);
        let (kind, _) = ccp.decoder_choice().unwrap();
        assert_eq!(*kind, AlgorithmKind::Deflate);
    }

    #[test]
    fn test_reject_trims_offer() {
        let mut ccp = CcpLayer::new(CcpConfig::default());
        let rejs = encode_option(ccp_options::DEFLATE, &[0x78, 0]);
        ccp.rej_received(&rejs);

        let req = ccp.build_request();
        let opts = options_of(&req);
        assert_eq!(opts.len(), 1);
        assert_eq!(opts[0].0, ccp_options::PREDICTOR1);
    }

    #[test]
    fn test_nak_shrinks_offered_window() {
        let mut ccp = CcpLayer::new(CcpConfig::default());
        let naks = encode_option(ccp_options::DEFLATE, &[0x48, 0]); // 12 bits
        ccp.nak_received(&naks);

        let req = ccp.build_request();
        let opts = options_of(&req);
        assert_eq!(opts[0].1, vec![0x48, 0]);
    }

    #[test]
    fn test_reset_request_acked_and_signalled() {
        let mut ccp = CcpLayer::new(CcpConfig::default());
        let mut out = Vec::new();
        assert!(ccp.extra_code(codes::RESET_REQUEST, 3, &[], State::Opened, &mut out));
        assert_eq!(ccp.take_events(), vec![CcpEvent::ResetEncoder]);
        match &out[0] {
            FsmAction::SendPacket(p) => {
                let parsed = CpPacket::parse(p).unwrap();
                assert_eq!(parsed.code(), codes::RESET_ACK);
                assert_eq!(parsed.identifier(), 3);
            }
            other => panic!("expected packet, got {other:?}"),
        }
    }

    #[test]
    fn test_reset_ignored_outside_opened() {
        let mut ccp = CcpLayer::new(CcpConfig::default());
        let mut out = Vec::new();
        assert!(ccp.extra_code(codes::RESET_REQUEST, 3, &[], State::ReqSent, &mut out));
        assert!(out.is_empty());
        assert!(ccp.take_events().is_empty());
    }
}
