use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};

use super::body_channel::BodyReceiver;
use crate::protocol::{ParseError, PayloadSize};

/// The request body as handed to a handler.
///
/// Data is pulled from the connection on demand. Reading fails with
/// [`ParseError::EntityTooLarge`] once more than the exchange's maximum entity size has been
/// declared or received, after which the rest of the body is abandoned.
#[derive(Debug)]
pub struct ReqBody {
    kind: Kind,
}

#[derive(Debug)]
enum Kind {
    Empty,
    Channel(BodyReceiver),
}

impl ReqBody {
    pub(crate) fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    pub(crate) fn channel(receiver: BodyReceiver) -> Self {
        Self { kind: Kind::Channel(receiver) }
    }

    pub(crate) fn set_limit(&mut self, limit: u64) {
        if let Kind::Channel(receiver) = &mut self.kind {
            receiver.set_limit(limit);
        }
    }

    /// The framing the request declared for this body.
    pub fn payload_size(&self) -> PayloadSize {
        match &self.kind {
            Kind::Empty => PayloadSize::Empty,
            Kind::Channel(receiver) => receiver.payload_size(),
        }
    }

    /// True when no more data will come, either because there was none or it was all read.
    pub fn is_finished(&self) -> bool {
        match &self.kind {
            Kind::Empty => true,
            Kind::Channel(receiver) => receiver.is_finished(),
        }
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().kind {
            Kind::Empty => Poll::Ready(None),
            Kind::Channel(receiver) => Pin::new(receiver).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.is_finished()
    }

    fn size_hint(&self) -> SizeHint {
        self.payload_size().into()
    }
}
