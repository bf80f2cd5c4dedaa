use std::collections::VecDeque;

use statig::{
    Response,
    prelude::{InitializedStateMachine, IntoStateMachineExt as _},
    state_machine,
};
use tracing::{error, trace, warn};

use crate::{Event, FmtpMessage, FmtpPacket, Timers, Tr, Ts, event::UserCommand};

/// I/O staging area of the association state machine.
///
/// The machine never touches the byte stream itself: frames it wants
/// transmitted go to `send_queue`, user messages it accepted go to
/// `recv_queue`, and the connection supervisor drains both after every
/// dispatch. Draining through a single owner is what keeps writes to the
/// stream serial.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssociationContext {
    send_queue: VecDeque<FmtpPacket>,
    recv_queue: VecDeque<FmtpMessage>,
}

impl AssociationContext {
    /// Takes the next frame queued for transmission.
    pub fn poll_transmit(&mut self) -> Option<FmtpPacket> {
        self.send_queue.pop_front()
    }

    /// Takes the next user message queued for delivery.
    pub fn poll_receive(&mut self) -> Option<FmtpMessage> {
        self.recv_queue.pop_front()
    }
}

/// The association state machine of one connection.
///
/// Wraps the statig machine built from [`AssociationMachine`]; the
/// supervisor feeds it [`Event`]s and drains the [`AssociationContext`].
#[derive(Debug, Clone)]
pub struct Association(InitializedStateMachine<AssociationMachine>);

impl Association {
    /// Creates the machine in the unassociated state.
    #[must_use]
    pub fn new(timers: Timers, ctx: &mut AssociationContext) -> Self {
        let sm = AssociationMachine { timers }
            .uninitialized_state_machine()
            .init_with_context(ctx);
        Self(sm)
    }

    /// Dispatches one event.
    pub fn handle(&mut self, event: &Event, ctx: &mut AssociationContext) {
        self.0.handle_with_context(event, ctx);
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> &State {
        self.0.state()
    }

    /// Whether an association is currently open.
    #[must_use]
    pub fn is_associated(&self) -> bool {
        matches!(self.state(), State::Associated { .. })
    }

    /// Whether the machine has hit a terminal condition and the connection
    /// must be torn down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.state(), State::Closed {})
    }
}

/// Shared storage of the association state machine.
#[derive(Debug, Clone)]
pub struct AssociationMachine {
    pub timers: Timers,
}

#[state_machine(
    initial = "State::unassociated()",
    on_transition = "Self::after_transition",
    state(derive(Clone, Debug, PartialEq, Eq)),
    superstate(derive(Clone, Debug))
)]
impl AssociationMachine {
    fn after_transition(&mut self, prev: &State, next: &State) {
        trace!("association transitioned from `{prev:?}` to `{next:?}`");
    }

    /// No association: user data is refused, STARTUP opens one.
    #[state]
    fn unassociated(&mut self, context: &mut AssociationContext, event: &Event) -> Response<State> {
        match event {
            // the peer opens; confirm with our own STARTUP and arm both timers
            Event::RStartup { now } => {
                context.send_queue.push_back(FmtpPacket::startup());
                Response::Transition(State::associated(
                    Tr(*now + self.timers.tr),
                    Ts(*now + self.timers.ts),
                ))
            }
            Event::UserCommand(UserCommand::Associate { .. }) => {
                context.send_queue.push_back(FmtpPacket::startup());
                Response::Transition(State::startup_pending())
            }
            // nothing to close; both are idempotent here
            Event::UserCommand(UserCommand::Deassociate { .. })
            | Event::RShutdown { .. }
            | Event::RHeartbeat { .. }
            | Event::RIgnored { .. } => Response::Handled,
            Event::RData { .. } => {
                warn!("received user data without an association, closing");
                Response::Transition(State::closed())
            }
            Event::UserCommand(UserCommand::Send { .. })
            | Event::TsExpired { .. }
            | Event::TrExpired { .. } => {
                error!("unexpected event {event:?} in UNASSOCIATED");
                Response::Transition(State::closed())
            }
        }
    }

    /// STARTUP sent, waiting for the peer's STARTUP in return.
    #[state]
    fn startup_pending(
        &mut self,
        context: &mut AssociationContext,
        event: &Event,
    ) -> Response<State> {
        match event {
            Event::RStartup { now } => Response::Transition(State::associated(
                Tr(*now + self.timers.tr),
                Ts(*now + self.timers.ts),
            )),
            Event::UserCommand(UserCommand::Deassociate { .. }) => {
                context.send_queue.push_back(FmtpPacket::shutdown());
                Response::Transition(State::unassociated())
            }
            Event::UserCommand(UserCommand::Associate { .. }) | Event::RIgnored { .. } => {
                Response::Handled
            }
            Event::RShutdown { .. } | Event::RHeartbeat { .. } | Event::RData { .. } => {
                warn!("only STARTUP may answer a STARTUP, closing");
                Response::Transition(State::closed())
            }
            Event::UserCommand(UserCommand::Send { .. })
            | Event::TsExpired { .. }
            | Event::TrExpired { .. } => {
                error!("unexpected event {event:?} in STARTUP_PENDING");
                Response::Transition(State::closed())
            }
        }
    }

    /// Association open: user data flows, Ts and Tr are armed.
    #[state]
    fn associated(
        &mut self,
        context: &mut AssociationContext,
        event: &Event,
        tr: &Tr,
        ts: &Ts,
    ) -> Response<State> {
        match event {
            // any reception resets Tr
            Event::RHeartbeat { now } | Event::RStartup { now } | Event::RIgnored { now } => {
                Response::Transition(State::associated(Tr(*now + self.timers.tr), *ts))
            }
            Event::RData { now, msg } => {
                context.recv_queue.push_back(msg.clone());
                Response::Transition(State::associated(Tr(*now + self.timers.tr), *ts))
            }
            Event::RShutdown { .. } => Response::Transition(State::unassociated()),
            // any transmission resets Ts
            Event::UserCommand(UserCommand::Send { now, msg }) => {
                context.send_queue.push_back(FmtpPacket::from_msg(msg.clone()));
                Response::Transition(State::associated(*tr, Ts(*now + self.timers.ts)))
            }
            Event::TsExpired { now } => {
                context.send_queue.push_back(FmtpPacket::heartbeat());
                Response::Transition(State::associated(*tr, Ts(*now + self.timers.ts)))
            }
            Event::TrExpired { .. } => {
                warn!("nothing received within Tr, shutting the association down");
                context.send_queue.push_back(FmtpPacket::shutdown());
                Response::Transition(State::unassociated())
            }
            Event::UserCommand(UserCommand::Deassociate { .. }) => {
                context.send_queue.push_back(FmtpPacket::shutdown());
                Response::Transition(State::unassociated())
            }
            Event::UserCommand(UserCommand::Associate { .. }) => Response::Handled,
        }
    }

    /// Terminal: a violation occurred and the supervisor must tear down.
    #[state]
    fn closed() -> Response<State> {
        Response::Handled
    }
}
