use super::{
    group::{is_element, is_prime, mod_pow, random_exponent, random_generator, random_prime, MIN_PRIME},
    Kind, Message, Primer, STATUS_OK,
};
use parley_utils::is_blank;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;
use zeroize::Zeroizing;

/// Which side of the exchange a [TransactionManager] plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Chooses the group parameters and opens the exchange (the client).
    Initiator,
    /// Answers the initiator (the server).
    Listener,
}

/// Position of a [TransactionManager] in its exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Initiator has not yet sent its primer.
    ShareStarter,
    /// Listener is waiting for the initiator's primer.
    AwaitStarter,
    /// Initiator waits for its primer to be echoed; listener waits for the acknowledgement.
    AwaitConfirmation,
    AwaitPublicKey,
    Complete,
    Failed,
}

/// Work performed when a transition fires.
#[derive(Clone, Copy, Debug)]
enum Action {
    /// Listener: validate and store the primer, then echo it.
    Echo,
    /// Initiator: check the echoed primer, then send our public value.
    Confirm,
    /// Listener: derive the secret from the initiator's public value and answer with ours.
    Respond,
    /// Initiator: derive the secret from the listener's public value and acknowledge.
    Acknowledge,
    /// Listener: commit the secret on a positive acknowledgement.
    Commit,
}

/// Every legal `(role, stage, kind)` and what it leads to. Anything else fails the handshake.
const TRANSITIONS: &[(Role, Stage, Kind, Action, Stage)] = &[
    (Role::Initiator, Stage::AwaitConfirmation, Kind::Primer, Action::Confirm, Stage::AwaitPublicKey),
    (Role::Initiator, Stage::AwaitPublicKey, Kind::PublicKey, Action::Acknowledge, Stage::Complete),
    (Role::Listener, Stage::AwaitStarter, Kind::Primer, Action::Echo, Stage::AwaitPublicKey),
    (Role::Listener, Stage::AwaitPublicKey, Kind::PublicKey, Action::Respond, Stage::AwaitConfirmation),
    (Role::Listener, Stage::AwaitConfirmation, Kind::End, Action::Commit, Stage::Complete),
];

fn lookup(role: Role, stage: Stage, kind: Kind) -> Option<(Action, Stage)> {
    TRANSITIONS
        .iter()
        .find(|(r, s, k, _, _)| *r == role && *s == stage && *k == kind)
        .map(|(_, _, _, action, next)| (*action, *next))
}

/// Renders a shared secret as the session key.
fn render(secret: u64) -> Zeroizing<String> {
    Zeroizing::new(format!("{secret:02x}"))
}

/// Drives one side of the key exchange.
///
/// Failure is sticky: once any message is rejected, [TransactionManager::has_failed]
/// stays `true` and further input is ignored. Once [Stage::Complete] is reached,
/// further input is ignored without failing.
pub struct TransactionManager<R: Rng = StdRng> {
    role: Role,
    stage: Stage,
    rng: R,

    primer: Option<Primer>,
    exponent: Option<Zeroizing<u64>>,
    pending: Option<Zeroizing<String>>,
    key: Option<Zeroizing<String>>,
}

impl TransactionManager<StdRng> {
    /// Creates an initiator seeded from system entropy.
    pub fn initiator() -> Self {
        Self::with_rng(Role::Initiator, StdRng::from_entropy())
    }

    /// Creates a listener seeded from system entropy.
    pub fn listener() -> Self {
        Self::with_rng(Role::Listener, StdRng::from_entropy())
    }
}

impl<R: Rng> TransactionManager<R> {
    pub fn with_rng(role: Role, rng: R) -> Self {
        let stage = match role {
            Role::Initiator => Stage::ShareStarter,
            Role::Listener => Stage::AwaitStarter,
        };
        Self {
            role,
            stage,
            rng,
            primer: None,
            exponent: None,
            pending: None,
            key: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Returns `true` once a session key has been committed.
    pub fn is_ready(&self) -> bool {
        self.key.is_some()
    }

    pub fn has_failed(&self) -> bool {
        self.stage == Stage::Failed
    }

    /// Returns `true` if the exchange has finished or failed.
    pub fn is_finished(&self) -> bool {
        matches!(self.stage, Stage::Complete | Stage::Failed)
    }

    /// The committed session key, if any.
    pub fn encryption_key(&self) -> Option<&str> {
        self.key.as_ref().map(|key| key.as_str())
    }

    /// Returns `true` if a derived key is waiting to be committed with [Self::apply].
    pub fn ready_to_apply(&self) -> bool {
        self.pending.is_some()
    }

    /// Commits the pending key, returning `false` if there was none.
    pub fn apply(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                self.key = Some(pending);
                true
            }
            None => false,
        }
    }

    /// Opens the exchange with a freshly generated primer.
    ///
    /// Only valid once, on an initiator. Any other use fails the handshake.
    pub fn initiate(&mut self) -> Option<String> {
        if self.role != Role::Initiator || self.stage != Stage::ShareStarter {
            self.fail("unexpected initiate");
            return None;
        }
        let primer = Primer {
            prime: random_prime(&mut self.rng),
            base: random_generator(&mut self.rng),
        };
        self.primer = Some(primer);
        self.stage = Stage::AwaitConfirmation;
        Some(Message::Primer(primer).encode())
    }

    /// Feeds a message from the peer, returning the reply to send (if any).
    pub fn evaluate(&mut self, message: &str) -> Option<String> {
        if self.is_finished() {
            return None;
        }
        if is_blank(message) {
            self.fail("empty message");
            return None;
        }
        let Some(message) = Message::parse(message) else {
            self.fail("unrecognized message");
            return None;
        };
        let Some((action, next)) = lookup(self.role, self.stage, message.kind()) else {
            self.fail("unexpected message");
            return None;
        };
        match self.act(action, message) {
            Ok(reply) => {
                self.stage = next;
                if next == Stage::Complete {
                    self.exponent = None;
                }
                reply.map(|reply| reply.encode())
            }
            Err(reason) => {
                self.fail(reason);
                None
            }
        }
    }

    fn act(&mut self, action: Action, message: Message) -> Result<Option<Message>, &'static str> {
        match (action, message) {
            (Action::Echo, Message::Primer(primer)) => {
                if primer.prime < MIN_PRIME || !is_prime(primer.prime as u64) {
                    return Err("invalid prime");
                }
                if !is_element(primer.base, primer.prime) {
                    return Err("invalid base");
                }
                self.primer = Some(primer);
                Ok(Some(Message::Primer(primer)))
            }
            (Action::Confirm, Message::Primer(primer)) => {
                let expected = self.primer.ok_or("missing primer")?;
                if primer != expected {
                    return Err("primer mismatch");
                }
                let public = self.draw(expected);
                Ok(Some(Message::PublicKey(public)))
            }
            (Action::Respond, Message::PublicKey(peer)) => {
                let primer = self.primer.ok_or("missing primer")?;
                if !is_element(peer, primer.prime) {
                    return Err("invalid public key");
                }
                let public = self.draw(primer);
                self.derive(primer, peer)?;
                Ok(Some(Message::PublicKey(public)))
            }
            (Action::Acknowledge, Message::PublicKey(peer)) => {
                let primer = self.primer.ok_or("missing primer")?;
                if !is_element(peer, primer.prime) {
                    return Err("invalid public key");
                }
                self.derive(primer, peer)?;
                Ok(Some(Message::ok()))
            }
            (Action::Commit, Message::End(status)) => {
                if status != STATUS_OK {
                    return Err("negative acknowledgement");
                }
                if !self.apply() {
                    return Err("missing secret");
                }
                Ok(None)
            }
            _ => Err("unexpected message"),
        }
    }

    /// Draws our secret exponent and returns the matching public value.
    fn draw(&mut self, primer: Primer) -> u32 {
        let exponent = Zeroizing::new(random_exponent(&mut self.rng, primer.prime));
        let public = mod_pow(primer.base as u64, *exponent, primer.prime as u64);
        self.exponent = Some(exponent);
        public as u32
    }

    /// Derives the shared secret from the peer's public value and stages it.
    fn derive(&mut self, primer: Primer, peer: u32) -> Result<(), &'static str> {
        let exponent = self.exponent.take().ok_or("missing exponent")?;
        let secret = Zeroizing::new(mod_pow(peer as u64, *exponent, primer.prime as u64));
        self.pending = Some(render(*secret));
        Ok(())
    }

    fn fail(&mut self, reason: &'static str) {
        debug!(role = ?self.role, stage = ?self.stage, reason, "handshake failed");
        self.stage = Stage::Failed;
        self.exponent = None;
        self.pending = None;
        self.key = None;
    }
}
