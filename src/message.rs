use crate::actor::ActorId;
use crate::endpoint::Endpoint;

/// The broad class of a message; used to index `MessageHandlerTable` and
/// (for `Unrecoverable`) to tag synthesized rejection responses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Category {
    Request,
    Response,
    OneWay,
    System,
    Unrecoverable,
}

pub const CATEGORY_COUNT: usize = 5;

impl Category {
    pub(crate) fn index(self) -> usize {
        match self {
            Category::Request => 0,
            Category::Response => 1,
            Category::OneWay => 2,
            Category::System => 3,
            Category::Unrecoverable => 4,
        }
    }
}

/// Whether a message expects a reply, is itself a reply, or is fire-and-forget.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    Request,
    Response,
    OneWay,
}

/// An opaque record routed by the message center. Payload bytes/framing are
/// out of scope here; this carries only what routing needs.
#[derive(Clone, Debug)]
pub struct Message {
    pub category: Category,
    pub direction: Direction,
    pub target_actor: ActorId,
    pub target_endpoint: Option<Endpoint>,
    pub is_unordered: bool,
    /// The raw payload, opaque to the message center. Framing/serialization
    /// of this is delegated to `Connection`'s codec.
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(category: Category, direction: Direction, target_actor: ActorId) -> Self {
        Message {
            category,
            direction,
            target_actor,
            target_endpoint: None,
            is_unordered: false,
            body: Vec::new(),
        }
    }

    pub fn pinned_to(mut self, endpoint: Endpoint) -> Self {
        self.target_endpoint = Some(endpoint);
        self
    }

    pub fn unordered(mut self) -> Self {
        self.is_unordered = true;
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

/// The reason a `Request` was rejected instead of answered, attached to the
/// synthetic `Unrecoverable` response routed back through the inbound path.
#[derive(Clone, Debug)]
pub struct Rejection {
    pub reason: String,
    pub cause: Option<String>,
}

/// Builds synthetic responses for messages the message center cannot
/// deliver, so a caller's awaiting promise resolves uniformly whether the
/// gateway answered or the client gave up on its behalf.
#[derive(Default, Clone, Copy)]
pub struct MessageFactory;

impl MessageFactory {
    pub fn create_rejection_response(
        &self,
        original: &Message,
        reason: impl Into<String>,
        cause: Option<String>,
    ) -> Message {
        let rejection = Rejection {
            reason: reason.into(),
            cause,
        };
        let mut response = Message::new(
            Category::Unrecoverable,
            Direction::Response,
            original.target_actor.clone(),
        );
        response.body = encode_rejection(&rejection);
        response
    }
}

fn encode_rejection(r: &Rejection) -> Vec<u8> {
    match &r.cause {
        Some(cause) => format!("{}: {}", r.reason, cause).into_bytes(),
        None => r.reason.clone().into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_response_is_unrecoverable_and_carries_reason() {
        let actor = ActorId::from_key("grain-1");
        let req = Message::new(Category::Request, Direction::Request, actor.clone());
        let factory = MessageFactory::default();
        let rsp = factory.create_rejection_response(&req, "No gateways available", None);
        assert!(matches!(rsp.category, Category::Unrecoverable));
        assert!(matches!(rsp.direction, Direction::Response));
        assert_eq!(rsp.target_actor, actor);
        assert_eq!(rsp.body, b"No gateways available");
    }
}
