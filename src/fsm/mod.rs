//! Option-negotiation state machine - RFC 1661 section 4
//!
//! One generic engine drives both LCP and CCP. Protocol-specific behavior
//! (which options to request, how to judge the peer's request, extra packet
//! codes) lives behind the [`ControlProtocol`] trait; the engine owns the
//! ten-state transition table, the restart counter and the retransmission
//! timer.
//!
//! The engine never performs I/O. Every event handler accumulates
//! [`FsmAction`]s that the owning link drains and applies: packets to
//! transmit and layer up/down/start/finish notifications.

pub mod ccp;
pub mod lcp;

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::protocol::cp::{codes, CpBuilder, CpPacket};
use crate::timer::Timer;

/// The ten negotiation states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Lower layer down, no open requested
    Initial,
    /// Open requested, waiting for the lower layer
    Starting,
    /// Lower layer up, no open requested
    Closed,
    /// Open requested but negotiation failed or peer withdrew
    Stopped,
    /// Terminate-Request sent after a close
    Closing,
    /// Terminate-Request sent, will re-open when done
    Stopping,
    /// Configure-Request sent
    ReqSent,
    /// Our request acknowledged, peer's still outstanding
    AckRcvd,
    /// Peer's request acknowledged, ours still outstanding
    AckSent,
    /// Both sides acknowledged
    Opened,
}

/// Whether `open` actively solicits the peer or waits for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Send the first Configure-Request ourselves
    #[default]
    Active,
    /// Wait for the peer's Configure-Request
    Passive,
}

/// Verdict on a peer Configure-Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReqJudgement {
    /// Every option acceptable as-is
    Ack,
    /// Some options need new values (the returned TLVs)
    Nak(Vec<u8>),
    /// Some options are not negotiable at all (the returned TLVs)
    Rej(Vec<u8>),
}

/// Output of an event handler, drained by the owning link.
#[derive(Debug, PartialEq, Eq)]
pub enum FsmAction {
    /// Transmit a complete control packet under this FSM's protocol number
    SendPacket(Vec<u8>),
    /// The lower layer is needed (administrative open from Initial)
    LayerStart,
    /// Negotiation reached Opened
    LayerUp,
    /// Leaving Opened
    LayerDown,
    /// Negotiation finished without (or after) Opened
    LayerFinish,
}

/// Protocol-specific half of the state machine.
pub trait ControlProtocol {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// PPP protocol number this FSM negotiates under.
    fn protocol(&self) -> u16;

    /// Highest packet code this protocol understands.
    fn max_code(&self) -> u8;

    /// Reset negotiation to the initial wants (on every fresh start).
    fn restart(&mut self);

    /// TLV options for our next Configure-Request.
    fn build_request(&mut self) -> Vec<u8>;

    /// Judge a peer Configure-Request's options.
    fn judge_request(&mut self, options: &[u8]) -> ReqJudgement;

    /// Our Configure-Request was acknowledged with these options.
    fn ack_received(&mut self, options: &[u8]);

    /// Peer suggested different values for these options.
    fn nak_received(&mut self, options: &[u8]);

    /// Peer refused to negotiate these options.
    fn rej_received(&mut self, options: &[u8]);

    /// Handle codes above the generic 1..=7 range.
    ///
    /// Returns false when the code is unknown, which makes the engine send
    /// a Code-Reject.
    fn extra_code(
        &mut self,
        _code: u8,
        _id: u8,
        _data: &[u8],
        _state: State,
        _out: &mut Vec<FsmAction>,
    ) -> bool {
        false
    }
}

/// Retry and timeout policy.
#[derive(Debug, Clone)]
pub struct FsmConfig {
    /// Open actively or passively
    pub mode: OpenMode,
    /// Retransmission interval
    pub timeout: Duration,
    /// Configure-Request retransmissions before giving up
    pub max_configure: u32,
    /// Terminate-Request retransmissions before giving up
    pub max_terminate: u32,
    /// Configure-Naks sent before treating an option as unnegotiable
    pub max_failure: u32,
}

impl Default for FsmConfig {
    fn default() -> Self {
        Self {
            mode: OpenMode::Active,
            timeout: Duration::from_secs(3),
            max_configure: 10,
            max_terminate: 2,
            max_failure: 5,
        }
    }
}

/// The negotiation engine for one protocol instance.
#[derive(Debug)]
pub struct Fsm<P: ControlProtocol> {
    /// Protocol-specific behavior and negotiated state
    pub layer: P,
    cfg: FsmConfig,
    state: State,
    /// Next identifier to assign
    next_id: u8,
    /// Identifier of the outstanding Configure-Request
    request_id: u8,
    retransmits: u32,
    nak_count: u32,
    timer: Timer,
    actions: Vec<FsmAction>,
}

impl<P: ControlProtocol> Fsm<P> {
    /// Create an FSM in the Initial state.
    pub fn new(layer: P, cfg: FsmConfig) -> Self {
        Self {
            layer,
            cfg,
            state: State::Initial,
            next_id: 0,
            request_id: 0,
            retransmits: 0,
            nak_count: 0,
            timer: Timer::new(),
            actions: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// True once negotiation has converged.
    pub fn is_opened(&self) -> bool {
        self.state == State::Opened
    }

    /// Drain accumulated actions in order.
    pub fn take_actions(&mut self) -> Vec<FsmAction> {
        std::mem::take(&mut self.actions)
    }

    fn enter(&mut self, state: State) {
        if state != self.state {
            debug!(
                proto = self.layer.name(),
                from = ?self.state,
                to = ?state,
                "fsm transition"
            );
            self.state = state;
        }
    }

    fn assign_id(&mut self) -> u8 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }

    fn send(&mut self, packet: Vec<u8>) {
        self.actions.push(FsmAction::SendPacket(packet));
    }

    fn send_configure_request(&mut self, now: Instant, retransmit: bool) {
        if !retransmit {
            self.request_id = self.assign_id();
            self.retransmits = self.cfg.max_configure;
        }
        let options = self.layer.build_request();
        let packet = CpBuilder::new(codes::CONFIGURE_REQUEST, self.request_id)
            .raw_data(&options)
            .build();
        self.send(packet);
        self.timer.start(now, self.cfg.timeout);
    }

    /// Send a protocol-specific packet under a fresh identifier.
    ///
    /// Used by the link for exchanges outside the negotiation proper,
    /// like CCP Reset-Request.
    pub fn send_code(&mut self, code: u8, data: &[u8]) -> u8 {
        let id = self.assign_id();
        self.send(CpBuilder::new(code, id).raw_data(data).build());
        id
    }

    fn send_terminate_request(&mut self, now: Instant) {
        self.retransmits = self.cfg.max_terminate;
        self.request_id = self.assign_id();
        let id = self.request_id;
        self.send(CpBuilder::new(codes::TERMINATE_REQUEST, id).build());
        self.timer.start(now, self.cfg.timeout);
    }

    fn send_terminate_ack(&mut self, id: u8) {
        self.send(CpBuilder::new(codes::TERMINATE_ACK, id).build());
    }

    /// Administrative open.
    pub fn open(&mut self, now: Instant) {
        match self.state {
            State::Initial => {
                self.enter(State::Starting);
                self.actions.push(FsmAction::LayerStart);
            }
            State::Closed => {
                self.layer.restart();
                self.nak_count = 0;
                match self.cfg.mode {
                    OpenMode::Passive => self.enter(State::Stopped),
                    OpenMode::Active => {
                        self.send_configure_request(now, false);
                        self.enter(State::ReqSent);
                    }
                }
            }
            State::Closing => self.enter(State::Stopping),
            // Re-opening an open or negotiating FSM is a no-op.
            _ => {}
        }
    }

    /// Administrative close.
    pub fn close(&mut self, now: Instant) {
        match self.state {
            State::Starting => {
                self.enter(State::Initial);
                self.actions.push(FsmAction::LayerFinish);
            }
            State::Stopped => self.enter(State::Closed),
            State::Stopping => self.enter(State::Closing),
            State::Opened => {
                self.actions.push(FsmAction::LayerDown);
                self.send_terminate_request(now);
                self.enter(State::Closing);
            }
            State::ReqSent | State::AckRcvd | State::AckSent => {
                self.send_terminate_request(now);
                self.enter(State::Closing);
            }
            State::Initial | State::Closed | State::Closing => {}
        }
    }

    /// The lower layer became available.
    pub fn up(&mut self, now: Instant) {
        match self.state {
            State::Initial => self.enter(State::Closed),
            State::Starting => {
                self.layer.restart();
                self.nak_count = 0;
                match self.cfg.mode {
                    OpenMode::Passive => self.enter(State::Stopped),
                    OpenMode::Active => {
                        self.send_configure_request(now, false);
                        self.enter(State::ReqSent);
                    }
                }
            }
            _ => warn!(proto = self.layer.name(), state = ?self.state, "up in unexpected state"),
        }
    }

    /// The lower layer went away.
    pub fn down(&mut self) {
        self.timer.stop();
        match self.state {
            State::Closed => self.enter(State::Initial),
            State::Stopped => {
                self.enter(State::Starting);
                self.actions.push(FsmAction::LayerStart);
            }
            State::Closing => self.enter(State::Initial),
            State::Stopping | State::ReqSent | State::AckRcvd | State::AckSent => {
                self.enter(State::Starting);
            }
            State::Opened => {
                self.enter(State::Starting);
                self.actions.push(FsmAction::LayerDown);
            }
            State::Initial | State::Starting => {}
        }
    }

    /// Service the retransmission timer.
    pub fn tick(&mut self, now: Instant) {
        if !self.timer.expired(now) {
            return;
        }
        match self.state {
            State::Closing | State::Stopping => {
                if self.retransmits > 0 {
                    self.retransmits -= 1;
                    let id = self.request_id;
                    self.send(CpBuilder::new(codes::TERMINATE_REQUEST, id).build());
                    self.timer.start(now, self.cfg.timeout);
                } else {
                    let next = if self.state == State::Closing {
                        State::Closed
                    } else {
                        State::Stopped
                    };
                    self.enter(next);
                    self.actions.push(FsmAction::LayerFinish);
                }
            }
            State::ReqSent | State::AckRcvd | State::AckSent => {
                if self.retransmits > 0 {
                    self.retransmits -= 1;
                    self.send_configure_request(now, true);
                    if self.state == State::AckRcvd {
                        self.enter(State::ReqSent);
                    }
                } else {
                    warn!(proto = self.layer.name(), "negotiation timed out");
                    self.enter(State::Stopped);
                    self.actions.push(FsmAction::LayerFinish);
                }
            }
            _ => {}
        }
    }

    /// Process an inbound control packet for this protocol.
    pub fn input(&mut self, now: Instant, data: &[u8]) {
        let packet = match CpPacket::parse(data) {
            Ok(p) => p,
            Err(e) => {
                warn!(proto = self.layer.name(), %e, "malformed control packet dropped");
                return;
            }
        };
        let code = packet.code();
        let id = packet.identifier();
        let payload = packet.data();

        if self.state == State::Initial || self.state == State::Starting {
            debug!(proto = self.layer.name(), code, "packet with lower layer down");
            return;
        }

        match code {
            codes::CONFIGURE_REQUEST => self.recv_configure_request(now, id, payload),
            codes::CONFIGURE_ACK => self.recv_configure_ack(now, id, payload),
            codes::CONFIGURE_NAK | codes::CONFIGURE_REJECT => {
                self.recv_configure_nak_rej(now, code, id, payload)
            }
            codes::TERMINATE_REQUEST => self.recv_terminate_request(now, id),
            codes::TERMINATE_ACK => self.recv_terminate_ack(now),
            codes::CODE_REJECT => self.recv_code_reject(),
            _ => {
                let handled = code <= self.layer.max_code()
                    && self
                        .layer
                        .extra_code(code, id, payload, self.state, &mut self.actions);
                if !handled {
                    debug!(proto = self.layer.name(), code, "code rejected");
                    let id = self.assign_id();
                    self.send(
                        CpBuilder::new(codes::CODE_REJECT, id)
                            .raw_data(packet.as_bytes())
                            .build(),
                    );
                }
            }
        }
    }

    fn recv_configure_request(&mut self, now: Instant, id: u8, options: &[u8]) {
        match self.state {
            State::Closed => {
                self.send_terminate_ack(id);
                return;
            }
            State::Closing | State::Stopping => return,
            State::Opened => {
                // Peer restarted negotiation underneath an open link.
                self.actions.push(FsmAction::LayerDown);
                self.send_configure_request(now, false);
                self.enter(State::ReqSent);
            }
            State::Stopped => {
                self.send_configure_request(now, false);
                self.enter(State::ReqSent);
            }
            _ => {}
        }

        let mut judgement = self.layer.judge_request(options);
        if let ReqJudgement::Nak(naks) = &judgement {
            // A peer that keeps requesting values we keep nakking will
            // never converge; cut the loop by rejecting outright.
            if self.nak_count >= self.cfg.max_failure {
                judgement = ReqJudgement::Rej(naks.clone());
            }
        }

        match judgement {
            ReqJudgement::Ack => {
                self.nak_count = 0;
                self.send(
                    CpBuilder::new(codes::CONFIGURE_ACK, id)
                        .raw_data(options)
                        .build(),
                );
                if self.state == State::AckRcvd {
                    self.timer.stop();
                    self.enter(State::Opened);
                    self.actions.push(FsmAction::LayerUp);
                } else {
                    self.enter(State::AckSent);
                }
            }
            ReqJudgement::Nak(naks) => {
                self.nak_count += 1;
                self.send(CpBuilder::new(codes::CONFIGURE_NAK, id).raw_data(&naks).build());
                if self.state == State::AckSent {
                    self.enter(State::ReqSent);
                }
            }
            ReqJudgement::Rej(rejs) => {
                self.send(
                    CpBuilder::new(codes::CONFIGURE_REJECT, id)
                        .raw_data(&rejs)
                        .build(),
                );
                if self.state == State::AckSent {
                    self.enter(State::ReqSent);
                }
            }
        }
    }

    fn recv_configure_ack(&mut self, now: Instant, id: u8, options: &[u8]) {
        if id != self.request_id {
            debug!(proto = self.layer.name(), id, "ack with stale identifier dropped");
            return;
        }
        match self.state {
            State::Closed | State::Stopped => self.send_terminate_ack(id),
            State::ReqSent => {
                self.layer.ack_received(options);
                self.retransmits = self.cfg.max_configure;
                self.enter(State::AckRcvd);
            }
            State::AckRcvd => {
                // Duplicate ack; restart our request.
                self.send_configure_request(now, false);
                self.enter(State::ReqSent);
            }
            State::AckSent => {
                self.layer.ack_received(options);
                self.timer.stop();
                self.retransmits = self.cfg.max_configure;
                self.enter(State::Opened);
                self.actions.push(FsmAction::LayerUp);
            }
            State::Opened => {
                // Crossed with a restart on the peer side.
                self.actions.push(FsmAction::LayerDown);
                self.send_configure_request(now, false);
                self.enter(State::ReqSent);
            }
            _ => {}
        }
    }

    fn recv_configure_nak_rej(&mut self, now: Instant, code: u8, id: u8, options: &[u8]) {
        if id != self.request_id {
            debug!(proto = self.layer.name(), id, "nak/rej with stale identifier dropped");
            return;
        }
        let apply = |layer: &mut P| {
            if code == codes::CONFIGURE_NAK {
                layer.nak_received(options);
            } else {
                layer.rej_received(options);
            }
        };
        match self.state {
            State::Closed | State::Stopped => self.send_terminate_ack(id),
            State::ReqSent => {
                apply(&mut self.layer);
                self.send_configure_request(now, false);
            }
            State::AckRcvd => {
                apply(&mut self.layer);
                self.send_configure_request(now, false);
                self.enter(State::ReqSent);
            }
            State::AckSent => {
                apply(&mut self.layer);
                self.send_configure_request(now, false);
            }
            State::Opened => {
                self.actions.push(FsmAction::LayerDown);
                apply(&mut self.layer);
                self.send_configure_request(now, false);
                self.enter(State::ReqSent);
            }
            _ => {}
        }
    }

    fn recv_terminate_request(&mut self, now: Instant, id: u8) {
        debug!(proto = self.layer.name(), "terminate requested by peer");
        match self.state {
            State::ReqSent | State::AckRcvd | State::AckSent => self.enter(State::ReqSent),
            State::Opened => {
                self.actions.push(FsmAction::LayerDown);
                // Zero the restart counter: give the peer one timeout of
                // grace to see our Terminate-Ack, then finish.
                self.retransmits = 0;
                self.timer.start(now, self.cfg.timeout);
                self.enter(State::Stopping);
            }
            _ => {}
        }
        self.send_terminate_ack(id);
    }

    fn recv_terminate_ack(&mut self, now: Instant) {
        match self.state {
            State::Closing => {
                self.timer.stop();
                self.enter(State::Closed);
                self.actions.push(FsmAction::LayerFinish);
            }
            State::Stopping => {
                self.timer.stop();
                self.enter(State::Stopped);
                self.actions.push(FsmAction::LayerFinish);
            }
            State::AckRcvd => self.enter(State::ReqSent),
            State::Opened => {
                self.actions.push(FsmAction::LayerDown);
                self.send_configure_request(now, false);
                self.enter(State::ReqSent);
            }
            _ => {}
        }
    }

    fn recv_code_reject(&mut self) {
        warn!(proto = self.layer.name(), "peer rejected one of our codes");
        if self.state == State::AckRcvd {
            self.enter(State::ReqSent);
        }
    }

    /// The peer sent a Protocol-Reject naming this protocol.
    pub fn protocol_rejected(&mut self) {
        warn!(proto = self.layer.name(), "protocol rejected by peer");
        self.timer.stop();
        match self.state {
            State::Initial | State::Starting => {}
            State::Closed | State::Closing => {
                self.enter(State::Closed);
                self.actions.push(FsmAction::LayerFinish);
            }
            State::Opened => {
                self.actions.push(FsmAction::LayerDown);
                self.enter(State::Stopped);
                self.actions.push(FsmAction::LayerFinish);
            }
            _ => {
                self.enter(State::Stopped);
                self.actions.push(FsmAction::LayerFinish);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal protocol accepting everything, for engine-only tests.
    struct Accepting;

    impl ControlProtocol for Accepting {
        fn name(&self) -> &'static str {
            "test"
        }
        fn protocol(&self) -> u16 {
            0xc021
        }
        fn max_code(&self) -> u8 {
            codes::CODE_REJECT
        }
        fn restart(&mut self) {}
        fn build_request(&mut self) -> Vec<u8> {
            Vec::new()
        }
        fn judge_request(&mut self, _options: &[u8]) -> ReqJudgement {
            ReqJudgement::Ack
        }
        fn ack_received(&mut self, _options: &[u8]) {}
        fn nak_received(&mut self, _options: &[u8]) {}
        fn rej_received(&mut self, _options: &[u8]) {}
    }

    fn fsm() -> Fsm<Accepting> {
        Fsm::new(Accepting, FsmConfig::default())
    }

    fn sent_packets(actions: &[FsmAction]) -> Vec<&Vec<u8>> {
        actions
            .iter()
            .filter_map(|a| match a {
                FsmAction::SendPacket(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_open_from_closed_sends_one_request() {
        let now = Instant::now();
        let mut f = fsm();
        f.up(now); // Initial -> Closed
        f.open(now);
        assert_eq!(f.state(), State::ReqSent);
        let actions = f.take_actions();
        let sent = sent_packets(&actions);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0], codes::CONFIGURE_REQUEST);
    }

    #[test]
    fn test_passive_open_waits_in_stopped() {
        let now = Instant::now();
        let mut f = Fsm::new(
            Accepting,
            FsmConfig {
                mode: OpenMode::Passive,
                ..FsmConfig::default()
            },
        );
        f.up(now);
        f.open(now);
        assert_eq!(f.state(), State::Stopped);
        assert!(sent_packets(&f.take_actions()).is_empty());
    }

    #[test]
    fn test_ack_then_request_reaches_opened_with_one_layer_up() {
        let now = Instant::now();
        let mut f = fsm();
        f.up(now);
        f.open(now);
        let request_id = {
            let actions = f.take_actions();
            sent_packets(&actions)[0][1]
        };

        // Peer acks our request: ReqSent -> AckRcvd.
        f.input(
            now,
            &CpBuilder::new(codes::CONFIGURE_ACK, request_id).build(),
        );
        assert_eq!(f.state(), State::AckRcvd);

        // Peer's own request: AckRcvd -> Opened, exactly one LayerUp.
        f.input(now, &CpBuilder::new(codes::CONFIGURE_REQUEST, 9).build());
        assert_eq!(f.state(), State::Opened);
        let actions = f.take_actions();
        let ups = actions.iter().filter(|a| **a == FsmAction::LayerUp).count();
        assert_eq!(ups, 1);
        let sent = sent_packets(&actions);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0], codes::CONFIGURE_ACK);
        assert_eq!(sent[0][1], 9);
    }

    #[test]
    fn test_open_while_opened_is_noop() {
        let now = Instant::now();
        let mut f = fsm();
        f.up(now);
        f.open(now);
        let id = sent_packets(&f.take_actions())[0][1];
        f.input(now, &CpBuilder::new(codes::CONFIGURE_REQUEST, 3).build());
        f.input(now, &CpBuilder::new(codes::CONFIGURE_ACK, id).build());
        assert_eq!(f.state(), State::Opened);
        f.take_actions();

        f.open(now);
        assert_eq!(f.state(), State::Opened);
        assert!(f.take_actions().is_empty());
    }

    #[test]
    fn test_stale_ack_identifier_ignored() {
        let now = Instant::now();
        let mut f = fsm();
        f.up(now);
        f.open(now);
        let id = sent_packets(&f.take_actions())[0][1];
        f.input(
            now,
            &CpBuilder::new(codes::CONFIGURE_ACK, id.wrapping_add(1)).build(),
        );
        assert_eq!(f.state(), State::ReqSent);
    }

    #[test]
    fn test_retry_budget_exhaustion_finishes_once() {
        let mut now = Instant::now();
        let cfg = FsmConfig {
            max_configure: 2,
            ..FsmConfig::default()
        };
        let mut f = Fsm::new(Accepting, cfg.clone());
        f.up(now);
        f.open(now);
        f.take_actions();

        let mut finishes = 0;
        let mut resends = 0;
        for _ in 0..5 {
            now += cfg.timeout;
            f.tick(now);
            for action in f.take_actions() {
                match action {
                    FsmAction::LayerFinish => finishes += 1,
                    FsmAction::SendPacket(p) if p[0] == codes::CONFIGURE_REQUEST => resends += 1,
                    _ => {}
                }
            }
        }
        assert_eq!(resends, 2);
        assert_eq!(finishes, 1);
        assert_eq!(f.state(), State::Stopped);
    }

    #[test]
    fn test_retransmission_keeps_identifier() {
        let mut now = Instant::now();
        let mut f = fsm();
        f.up(now);
        f.open(now);
        let first = sent_packets(&f.take_actions())[0].clone();

        now += Duration::from_secs(3);
        f.tick(now);
        let second = sent_packets(&f.take_actions())[0].clone();
        assert_eq!(first[1], second[1]);
    }

    #[test]
    fn test_close_from_opened_terminates() {
        let now = Instant::now();
        let mut f = fsm();
        f.up(now);
        f.open(now);
        let id = sent_packets(&f.take_actions())[0][1];
        f.input(now, &CpBuilder::new(codes::CONFIGURE_REQUEST, 1).build());
        f.input(now, &CpBuilder::new(codes::CONFIGURE_ACK, id).build());
        f.take_actions();

        f.close(now);
        assert_eq!(f.state(), State::Closing);
        let actions = f.take_actions();
        assert!(actions.contains(&FsmAction::LayerDown));
        let sent = sent_packets(&actions);
        assert_eq!(sent[0][0], codes::TERMINATE_REQUEST);

        // Peer's Terminate-Ack completes the close.
        f.input(now, &CpBuilder::new(codes::TERMINATE_ACK, sent[0][1]).build());
        assert_eq!(f.state(), State::Closed);
        assert!(f.take_actions().contains(&FsmAction::LayerFinish));
    }

    #[test]
    fn test_peer_terminate_from_opened() {
        let now = Instant::now();
        let mut f = fsm();
        f.up(now);
        f.open(now);
        let id = sent_packets(&f.take_actions())[0][1];
        f.input(now, &CpBuilder::new(codes::CONFIGURE_REQUEST, 1).build());
        f.input(now, &CpBuilder::new(codes::CONFIGURE_ACK, id).build());
        f.take_actions();

        f.input(now, &CpBuilder::new(codes::TERMINATE_REQUEST, 5).build());
        assert_eq!(f.state(), State::Stopping);
        let actions = f.take_actions();
        assert!(actions.contains(&FsmAction::LayerDown));
        let sent = sent_packets(&actions);
        assert_eq!(sent[0][0], codes::TERMINATE_ACK);
        assert_eq!(sent[0][1], 5);
    }

    #[test]
    fn test_unknown_code_is_code_rejected() {
        let now = Instant::now();
        let mut f = fsm();
        f.up(now);
        f.open(now);
        f.take_actions();
        f.input(now, &CpBuilder::new(0x42, 1).build());
        let actions = f.take_actions();
        let sent = sent_packets(&actions);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0], codes::CODE_REJECT);
        // The rejected packet rides in the data field.
        assert_eq!(&sent[0][4..], &CpBuilder::new(0x42, 1).build()[..]);
    }

    #[test]
    fn test_down_from_opened_goes_starting() {
        let now = Instant::now();
        let mut f = fsm();
        f.up(now);
        f.open(now);
        let id = sent_packets(&f.take_actions())[0][1];
        f.input(now, &CpBuilder::new(codes::CONFIGURE_REQUEST, 1).build());
        f.input(now, &CpBuilder::new(codes::CONFIGURE_ACK, id).build());
        f.take_actions();

        f.down();
        assert_eq!(f.state(), State::Starting);
        assert!(f.take_actions().contains(&FsmAction::LayerDown));

        // Link back up: negotiation restarts from scratch.
        f.up(now);
        assert_eq!(f.state(), State::ReqSent);
    }

    #[test]
    fn test_protocol_reject_stops() {
        let now = Instant::now();
        let mut f = fsm();
        f.up(now);
        f.open(now);
        f.take_actions();
        f.protocol_rejected();
        assert_eq!(f.state(), State::Stopped);
        assert!(f.take_actions().contains(&FsmAction::LayerFinish));
    }

    #[test]
    fn test_malformed_packet_no_state_change() {
        let now = Instant::now();
        let mut f = fsm();
        f.up(now);
        f.open(now);
        f.take_actions();
        // Length field exceeds the buffer.
        f.input(now, &[codes::CONFIGURE_ACK, 1, 0x00, 0x40]);
        assert_eq!(f.state(), State::ReqSent);
        assert!(f.take_actions().is_empty());
    }
}
