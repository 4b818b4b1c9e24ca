//! Per-link state aggregation.
//!
//! A [`Link`] owns everything one PPP line needs: the LCP and CCP state
//! machines, the HDLC codec and deframer, the VJ connection table, and the
//! active CCP encoder/decoder pair once compression negotiates. The caller
//! drives it with raw wire bytes, outbound IP packets, and a clock; framed
//! wire bytes and delivered IP packets come back out through the poll
//! methods. Nothing in here performs I/O.

use std::collections::VecDeque;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::buffer::FrameBuf;
use crate::compress::{make_decoder, make_encoder, Decoder, Encoder};
use crate::fsm::ccp::{CcpConfig, CcpEvent, CcpLayer};
use crate::fsm::lcp::{LcpConfig, LcpLayer, DEFAULT_MRU};
use crate::fsm::{Fsm, FsmAction, FsmConfig, State};
use crate::hdlc::{Deframer, FrameError, FramingMode, HdlcCodec};
use crate::protocol::cp::{codes, CpPacket};
use crate::protocol::ppp::{is_compressible, protocols};
use crate::telemetry::LinkStats;
use crate::vj::{VjConfig, VjKind, VjTable};

/// Everything needed to build a [`Link`].
#[derive(Debug, Clone, Default)]
pub struct LinkConfig {
    pub framing: FramingMode,
    pub lcp: LcpConfig,
    pub ccp: CcpConfig,
    pub fsm: FsmConfig,
    pub vj: VjConfig,
}

/// One PPP link: control protocols, framing, and data-path compression.
pub struct Link {
    lcp: Fsm<LcpLayer>,
    ccp: Fsm<CcpLayer>,
    codec: HdlcCodec,
    deframer: Deframer,
    vj: Option<VjTable>,
    encoder: Option<Box<dyn Encoder + Send>>,
    decoder: Option<Box<dyn Decoder + Send>>,
    stats: LinkStats,
    tx: VecDeque<Vec<u8>>,
    delivered: VecDeque<Vec<u8>>,
    /// Largest inbound frame the deframer will accept, sized from our MRU
    rx_max_frame: usize,
    /// Reset-Request sent, Reset-Ack still outstanding
    reset_pending: bool,
}

impl Link {
    pub fn new(cfg: LinkConfig) -> Self {
        let vj = cfg
            .vj
            .enabled
            .then(|| VjTable::new(cfg.vj.slots, cfg.vj.compress_cid));
        // The peer may send full default-MRU frames until negotiation
        // settles, so never size the deframer below that.
        let rx_max_frame = cfg.lcp.mru.max(DEFAULT_MRU) as usize + 8;
        Self {
            lcp: Fsm::new(LcpLayer::new(cfg.lcp), cfg.fsm.clone()),
            ccp: Fsm::new(CcpLayer::new(cfg.ccp), cfg.fsm),
            codec: HdlcCodec::new(cfg.framing),
            deframer: Deframer::with_max_frame(rx_max_frame),
            vj,
            encoder: None,
            decoder: None,
            stats: LinkStats::new(),
            tx: VecDeque::new(),
            delivered: VecDeque::new(),
            rx_max_frame,
            reset_pending: false,
        }
    }

    /// Administrative open: start negotiating as soon as the line is up.
    pub fn open(&mut self, now: Instant) {
        self.lcp.open(now);
        self.ccp.open(now);
        self.apply_actions(now);
    }

    /// Administrative close: negotiate an orderly shutdown.
    pub fn close(&mut self, now: Instant) {
        self.ccp.close(now);
        self.lcp.close(now);
        self.apply_actions(now);
    }

    /// The physical line came up.
    pub fn lower_up(&mut self, now: Instant) {
        self.lcp.up(now);
        self.apply_actions(now);
    }

    /// The physical line dropped (carrier loss and the like).
    pub fn lower_down(&mut self, now: Instant) {
        self.lcp.down();
        self.codec.reset();
        self.deframer = Deframer::with_max_frame(self.rx_max_frame);
        self.apply_actions(now);
    }

    /// Current LCP state.
    pub fn lcp_state(&self) -> State {
        self.lcp.state()
    }

    /// Current CCP state.
    pub fn ccp_state(&self) -> State {
        self.ccp.state()
    }

    /// True once LCP has converged.
    pub fn is_up(&self) -> bool {
        self.lcp.is_opened()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Feed received line bytes.
    ///
    /// In async mode the bytes are an undelimited stream carrying any
    /// number of partial or complete frames. In sync mode the hardware
    /// preserves frame boundaries, so each call must carry exactly one
    /// whole frame.
    pub fn input(&mut self, now: Instant, bytes: &[u8]) {
        match self.codec.mode {
            FramingMode::Async => {
                for frame in self.deframer.input(bytes) {
                    self.input_frame(now, frame);
                }
            }
            FramingMode::Sync => {
                if !bytes.is_empty() {
                    self.input_frame(now, FrameBuf::from_vec(bytes.to_vec()));
                }
            }
        }
    }

    fn input_frame(&mut self, now: Instant, frame: FrameBuf) {
        match self.codec.deframe(frame) {
            Ok(logical) => {
                self.stats.record_rx(logical.payload.len());
                let payload = logical.payload.to_vec();
                self.dispatch(now, logical.protocol, payload);
            }
            Err(e) => {
                debug!(error = ?e, "frame dropped");
                match e {
                    FrameError::BadFcs => self.stats.fcs_errors.inc(),
                    _ => self.stats.frame_errors.inc(),
                }
                // A damaged frame may have been compressed traffic.
                if let Some(vj) = &mut self.vj {
                    vj.recv_error();
                }
            }
        }
    }

    fn dispatch(&mut self, now: Instant, protocol: u16, payload: Vec<u8>) {
        match protocol {
            protocols::LCP => {
                self.inspect_protocol_reject(&payload);
                self.lcp.input(now, &payload);
                self.apply_actions(now);
            }
            protocols::CCP => {
                if self.lcp.is_opened() {
                    self.ccp.input(now, &payload);
                    self.apply_actions(now);
                } else {
                    self.stats.drops.inc();
                }
            }
            protocols::COMPRESSED => self.input_compressed(now, &payload),
            p if self.lcp.is_opened() && is_compressible(p) => {
                // Plain data while compression runs still has to pass
                // through the dictionaries.
                if let Some(decoder) = &mut self.decoder {
                    decoder.feed(p, &payload);
                }
                self.deliver(p, payload);
            }
            p => {
                self.stats.protocol_rejects.inc();
                if self.lcp.is_opened() {
                    debug!(protocol = format_args!("{p:#06x}"), "rejecting protocol");
                    let mut data = p.to_be_bytes().to_vec();
                    data.extend_from_slice(&payload);
                    self.lcp.send_code(codes::PROTOCOL_REJECT, &data);
                    self.apply_actions(now);
                } else {
                    self.stats.drops.inc();
                }
            }
        }
    }

    fn input_compressed(&mut self, now: Instant, payload: &[u8]) {
        let Some(decoder) = &mut self.decoder else {
            self.stats.drops.inc();
            return;
        };
        match decoder.decode(payload) {
            Ok((proto, packet)) => self.deliver(proto, packet),
            Err(e) => {
                warn!(error = %e, "decompression desync");
                self.stats.desyncs.inc();
                self.request_reset(now);
            }
        }
    }

    /// Hand a decompressed inner frame to the IP side, via VJ if needed.
    fn deliver(&mut self, protocol: u16, packet: Vec<u8>) {
        let kind = match protocol {
            protocols::IP => VjKind::Ip,
            protocols::VJ_COMPRESSED => VjKind::CompressedTcp,
            protocols::VJ_UNCOMPRESSED => VjKind::UncompressedTcp,
            _ => {
                self.stats.drops.inc();
                return;
            }
        };
        if kind == VjKind::Ip {
            self.delivered.push_back(packet);
            return;
        }
        let Some(vj) = &mut self.vj else {
            self.stats.drops.inc();
            return;
        };
        match vj.decompress(&packet, kind) {
            Ok(ip) => self.delivered.push_back(ip),
            Err(_) => {
                self.stats.vj_errors.inc();
                self.stats.drops.inc();
            }
        }
    }

    /// Queue an outbound IP packet, compressing as negotiated.
    pub fn send_ip(&mut self, _now: Instant, packet: Vec<u8>) {
        if !self.lcp.is_opened() {
            self.stats.drops.inc();
            return;
        }
        let mut packet = packet;
        let mut proto = protocols::IP;
        if let Some(vj) = &mut self.vj {
            proto = match vj.compress(&mut packet) {
                VjKind::Ip => protocols::IP,
                VjKind::UncompressedTcp => protocols::VJ_UNCOMPRESSED,
                VjKind::CompressedTcp => protocols::VJ_COMPRESSED,
            };
        }
        if let Some(encoder) = &mut self.encoder {
            if is_compressible(proto) {
                if let Some(body) = encoder.encode(proto, &packet) {
                    self.queue_frame(protocols::COMPRESSED, &body);
                    return;
                }
                // Didn't shrink; the encoder folded it into its dictionary
                // and the frame goes out plain.
            }
        }
        self.queue_frame(proto, &packet);
    }

    /// Service retransmission timers.
    pub fn tick(&mut self, now: Instant) {
        self.lcp.tick(now);
        self.ccp.tick(now);
        self.apply_actions(now);
    }

    /// Send an LCP Echo-Request keepalive (only meaningful when up).
    pub fn send_echo_request(&mut self, _now: Instant) {
        if self.lcp.is_opened() {
            let packet = self.lcp.layer.build_echo_request();
            self.queue_frame(protocols::LCP, &packet);
        }
    }

    /// Drain queued wire bytes as one stream for the line writer.
    ///
    /// Only valid on async lines, where flags delimit the frames. Sync
    /// lines must use [`poll_transmit_frames`](Self::poll_transmit_frames).
    pub fn poll_transmit(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(frame) = self.tx.pop_front() {
            out.extend_from_slice(&frame);
        }
        out
    }

    /// Drain queued frames one at a time, preserving boundaries.
    pub fn poll_transmit_frames(&mut self) -> Vec<Vec<u8>> {
        self.tx.drain(..).collect()
    }

    /// Drain decompressed IP packets for the tunnel side.
    pub fn poll_delivered(&mut self) -> Vec<Vec<u8>> {
        self.delivered.drain(..).collect()
    }

    fn queue_frame(&mut self, protocol: u16, payload: &[u8]) {
        let wire = self.codec.frame(protocol, payload);
        self.stats.record_tx(wire.len());
        self.tx.push_back(wire);
    }

    fn request_reset(&mut self, now: Instant) {
        if self.reset_pending || !self.ccp.is_opened() {
            return;
        }
        self.reset_pending = true;
        self.stats.resets.inc();
        self.ccp.send_code(codes::RESET_REQUEST, &[]);
        self.apply_actions(now);
    }

    /// A Protocol-Reject naming CCP shuts compression down for good.
    fn inspect_protocol_reject(&mut self, payload: &[u8]) {
        let Ok(packet) = CpPacket::parse(payload) else {
            return;
        };
        if packet.code() != codes::PROTOCOL_REJECT || packet.data().len() < 2 {
            return;
        }
        let rejected = u16::from_be_bytes([packet.data()[0], packet.data()[1]]);
        if rejected == protocols::CCP {
            warn!("peer rejected ccp, disabling compression");
            self.ccp.protocol_rejected();
            self.encoder = None;
            self.decoder = None;
        }
    }

    /// Drain and apply FSM actions until the cascade settles. An LCP
    /// LayerUp immediately raises CCP, which may emit its own packets.
    fn apply_actions(&mut self, now: Instant) {
        loop {
            let lcp_actions = self.lcp.take_actions();
            let ccp_actions = self.ccp.take_actions();
            if lcp_actions.is_empty() && ccp_actions.is_empty() {
                break;
            }
            for action in lcp_actions {
                self.apply_lcp_action(now, action);
            }
            for action in ccp_actions {
                self.apply_ccp_action(action);
            }
        }
        for event in self.ccp.layer.take_events() {
            match event {
                CcpEvent::ResetEncoder => {
                    debug!("resetting transmit compressor");
                    self.stats.resets.inc();
                    if let Some(encoder) = &mut self.encoder {
                        encoder.reset();
                    }
                }
                CcpEvent::ResetDecoder => {
                    debug!("resetting receive decompressor");
                    self.reset_pending = false;
                    if let Some(decoder) = &mut self.decoder {
                        decoder.reset();
                    }
                }
            }
        }
    }

    fn apply_lcp_action(&mut self, now: Instant, action: FsmAction) {
        match action {
            FsmAction::SendPacket(packet) => self.queue_frame(protocols::LCP, &packet),
            FsmAction::LayerStart => debug!("lcp wants the lower layer up"),
            FsmAction::LayerUp => {
                let negotiated = self.lcp.layer.negotiated();
                info!(
                    peer_mru = negotiated.peer_mru,
                    accm = format_args!("{:#010x}", negotiated.tx_accm),
                    pfc = negotiated.tx_pfc,
                    acfc = negotiated.tx_acfc,
                    "lcp up"
                );
                self.codec.tx_accm = negotiated.tx_accm;
                self.codec.tx_pfc = negotiated.tx_pfc;
                self.codec.tx_acfc = negotiated.tx_acfc;
                self.codec.rx_acfc = negotiated.rx_acfc;
                self.ccp.up(now);
            }
            FsmAction::LayerDown => {
                info!("lcp down");
                self.codec.reset();
                self.ccp.down();
            }
            FsmAction::LayerFinish => info!("lcp finished"),
        }
    }

    fn apply_ccp_action(&mut self, action: FsmAction) {
        match action {
            FsmAction::SendPacket(packet) => self.queue_frame(protocols::CCP, &packet),
            FsmAction::LayerStart => {}
            FsmAction::LayerUp => {
                self.reset_pending = false;
                self.encoder = self
                    .ccp
                    .layer
                    .encoder_choice()
                    .map(|(kind, data)| make_encoder(*kind, data));
                self.decoder = self
                    .ccp
                    .layer
                    .decoder_choice()
                    .map(|(kind, data)| make_decoder(*kind, data));
                let name = |choice: Option<&'static str>| choice.unwrap_or("none");
                info!(
                    tx = name(self.ccp.layer.encoder_choice().map(|(k, _)| k.name())),
                    rx = name(self.ccp.layer.decoder_choice().map(|(k, _)| k.name())),
                    "ccp up"
                );
            }
            FsmAction::LayerDown => {
                info!("ccp down");
                self.encoder = None;
                self.decoder = None;
                self.reset_pending = false;
            }
            FsmAction::LayerFinish => debug!("ccp finished"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pair() -> (Link, Link, Instant) {
        let active = Link::new(LinkConfig::default());
        let passive = Link::new(LinkConfig {
            fsm: FsmConfig {
                mode: crate::fsm::OpenMode::Passive,
                ..FsmConfig::default()
            },
            ..LinkConfig::default()
        });
        (active, passive, Instant::now())
    }

    fn shuttle(a: &mut Link, b: &mut Link, now: Instant) {
        for _ in 0..12 {
            let from_a = a.poll_transmit();
            let from_b = b.poll_transmit();
            if from_a.is_empty() && from_b.is_empty() {
                break;
            }
            b.input(now, &from_a);
            a.input(now, &from_b);
        }
    }

    /// Per-frame shuttle, as a sync line delivers.
    fn shuttle_frames(a: &mut Link, b: &mut Link, now: Instant) {
        for _ in 0..12 {
            let from_a = a.poll_transmit_frames();
            let from_b = b.poll_transmit_frames();
            if from_a.is_empty() && from_b.is_empty() {
                break;
            }
            for frame in from_a {
                b.input(now, &frame);
            }
            for frame in from_b {
                a.input(now, &frame);
            }
        }
    }

    #[test]
    fn test_links_converge_and_pass_traffic() {
        let (mut a, mut b, now) = pair();
        a.open(now);
        b.open(now);
        a.lower_up(now);
        b.lower_up(now);
        shuttle(&mut a, &mut b, now);

        assert!(a.is_up());
        assert!(b.is_up());
        assert!(a.ccp_state() == State::Opened);
        assert!(b.ccp_state() == State::Opened);

        let packet = vec![0x45, 0x00, 0x00, 0x04]; // too short for VJ, plain IP
        a.send_ip(now, packet.clone());
        shuttle(&mut a, &mut b, now);
        assert_eq!(b.poll_delivered(), vec![packet]);
    }

    #[test]
    fn test_sync_links_converge_and_pass_traffic() {
        let mut a = Link::new(LinkConfig {
            framing: FramingMode::Sync,
            ..LinkConfig::default()
        });
        let mut b = Link::new(LinkConfig {
            framing: FramingMode::Sync,
            fsm: FsmConfig {
                mode: crate::fsm::OpenMode::Passive,
                ..FsmConfig::default()
            },
            ..LinkConfig::default()
        });
        let now = Instant::now();
        a.open(now);
        b.open(now);
        a.lower_up(now);
        b.lower_up(now);
        shuttle_frames(&mut a, &mut b, now);

        assert!(a.is_up());
        assert!(b.is_up());
        assert!(b.stats().rx_frames.get() > 0);

        let packet = vec![0x45, 0x00, 0x00, 0x04];
        a.send_ip(now, packet.clone());
        shuttle_frames(&mut a, &mut b, now);
        assert_eq!(b.poll_delivered(), vec![packet]);
    }

    #[test]
    fn test_generous_mru_accepts_large_frames() {
        let cfg = |mode| LinkConfig {
            lcp: LcpConfig {
                mru: 4000,
                ..LcpConfig::default()
            },
            ccp: CcpConfig {
                algorithms: Vec::new(),
                ..CcpConfig::default()
            },
            fsm: FsmConfig {
                mode,
                ..FsmConfig::default()
            },
            ..LinkConfig::default()
        };
        let mut a = Link::new(cfg(crate::fsm::OpenMode::Active));
        let mut b = Link::new(cfg(crate::fsm::OpenMode::Passive));
        let now = Instant::now();
        a.open(now);
        b.open(now);
        a.lower_up(now);
        b.lower_up(now);
        shuttle(&mut a, &mut b, now);
        assert!(a.is_up());
        assert!(b.is_up());

        // Larger than the default deframer limit but inside our MRU.
        let mut packet = vec![0u8; 2000];
        packet[0] = 0x45;
        packet[9] = 17;
        a.send_ip(now, packet.clone());
        shuttle(&mut a, &mut b, now);
        assert_eq!(b.poll_delivered(), vec![packet]);
    }

    #[test]
    fn test_unknown_protocol_gets_rejected() {
        let (mut a, mut b, now) = pair();
        a.open(now);
        b.open(now);
        a.lower_up(now);
        b.lower_up(now);
        shuttle(&mut a, &mut b, now);

        // Hand-frame an unknown protocol at B.
        let wire = b.codec.frame(0x8035, b"??");
        a.input(now, &wire);
        assert_eq!(a.stats().protocol_rejects.get(), 1);
        assert!(!a.poll_transmit().is_empty());
    }

    #[test]
    fn test_send_before_up_is_dropped() {
        let (mut a, _, now) = pair();
        a.send_ip(now, vec![0x45; 40]);
        assert!(a.poll_transmit().is_empty());
        assert_eq!(a.stats().drops.get(), 1);
    }

    #[test]
    fn test_negotiation_timeout_finishes() {
        let mut a = Link::new(LinkConfig::default());
        let mut now = Instant::now();
        a.open(now);
        a.lower_up(now);
        let _ = a.poll_transmit();

        for _ in 0..20 {
            now += Duration::from_secs(4);
            a.tick(now);
            let _ = a.poll_transmit();
        }
        assert_eq!(a.lcp_state(), State::Stopped);
    }
}
