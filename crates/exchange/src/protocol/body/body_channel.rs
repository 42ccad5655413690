use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt, channel::mpsc};
use http_body::{Body, Frame, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, error, warn};

use super::ReqBody;

/// Splits a request body into the side reading the connection and the side handed to the exchange.
///
/// The receiver asks for data with a signal, the sender only reads the connection when asked,
/// so a body nobody reads never gets buffered.
pub(crate) fn body_channel<S, T>(body_stream: &mut S, payload_size: PayloadSize) -> (BodySender<'_, S>, ReqBody)
where
    S: Stream<Item = Result<Message<T>, ParseError>> + Unpin,
{
    let (signal_sender, signal_receiver) = mpsc::channel(8);
    let (data_sender, data_receiver) = mpsc::channel(8);

    (
        BodySender::new(body_stream, signal_receiver, data_sender),
        ReqBody::channel(BodyReceiver::new(signal_sender, data_receiver, payload_size)),
    )
}

#[derive(Debug)]
pub(crate) enum BodyRequestSignal {
    RequestData,
    /// the receiver gave up, the rest of the body must not be read
    Enough,
}

pub(crate) struct BodySender<'conn, S> {
    payload_stream: &'conn mut S,
    signal_receiver: mpsc::Receiver<BodyRequestSignal>,
    data_sender: mpsc::Sender<Result<PayloadItem, ParseError>>,
    eof: bool,
    abandoned: bool,
}

impl<'conn, S, T> BodySender<'conn, S>
where
    S: Stream<Item = Result<Message<T>, ParseError>> + Unpin,
{
    pub(crate) fn new(
        payload_stream: &'conn mut S,
        signal_receiver: mpsc::Receiver<BodyRequestSignal>,
        data_sender: mpsc::Sender<Result<PayloadItem, ParseError>>,
    ) -> Self {
        Self { payload_stream, signal_receiver, data_sender, eof: false, abandoned: false }
    }

    /// The whole body has been read off the connection.
    pub(crate) fn is_eof(&self) -> bool {
        self.eof
    }

    /// The body was cut short, the connection position can't be trusted any more.
    pub(crate) fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// Serves data requests until the body ends, the receiver goes away or gives up.
    pub(crate) async fn start(&mut self) {
        if self.eof || self.abandoned {
            return;
        }

        while let Some(signal) = self.signal_receiver.next().await {
            match signal {
                BodyRequestSignal::RequestData => match self.read_data().await {
                    Ok(payload_item) => {
                        self.eof = payload_item.is_eof();
                        if self.data_sender.send(Ok(payload_item)).await.is_err() {
                            debug!("request body receiver dropped while data was in flight");
                            return;
                        }
                        if self.eof {
                            return;
                        }
                    }
                    Err(e) => {
                        error!(cause = %e, "failed to read request body");
                        self.abandoned = true;
                        let _ = self.data_sender.send(Err(e)).await;
                        return;
                    }
                },

                BodyRequestSignal::Enough => {
                    self.abandoned = true;
                    return;
                }
            }
        }
    }

    /// Picks up signals sent after this sender stopped being polled.
    pub(crate) fn drain_signals(&mut self) {
        while let Ok(Some(signal)) = self.signal_receiver.try_next() {
            if matches!(signal, BodyRequestSignal::Enough) {
                self.abandoned = true;
            }
        }
    }

    async fn read_data(&mut self) -> Result<PayloadItem, ParseError> {
        match self.payload_stream.next().await {
            Some(Ok(Message::Payload(payload_item))) => Ok(payload_item),
            Some(Ok(Message::Header(_))) => {
                error!("should not receive header in BodySender");
                Err(ParseError::invalid_body("should not receive header in BodySender"))
            }
            Some(Err(e)) => Err(e),
            None => Err(ParseError::invalid_body("connection closed before the request body ended")),
        }
    }

    /// Reads and drops what is left of the body, returning how many bytes were skipped.
    pub(crate) async fn skip_data(&mut self) -> Result<u64, ParseError> {
        let mut skipped = 0;
        while !self.eof {
            match self.read_data().await? {
                PayloadItem::Eof => self.eof = true,
                PayloadItem::Chunk(bytes) => skipped += bytes.len() as u64,
            }
        }
        Ok(skipped)
    }
}

#[derive(Debug)]
pub(crate) struct BodyReceiver {
    signal_sender: mpsc::Sender<BodyRequestSignal>,
    data_receiver: mpsc::Receiver<Result<PayloadItem, ParseError>>,
    payload_size: PayloadSize,
    in_flight: bool,
    received: u64,
    limit: Option<u64>,
    finished: bool,
}

impl BodyReceiver {
    pub(crate) fn new(
        signal_sender: mpsc::Sender<BodyRequestSignal>,
        data_receiver: mpsc::Receiver<Result<PayloadItem, ParseError>>,
        payload_size: PayloadSize,
    ) -> Self {
        Self { signal_sender, data_receiver, payload_size, in_flight: false, received: 0, limit: None, finished: false }
    }

    pub(crate) fn set_limit(&mut self, limit: u64) {
        self.limit = Some(limit);
    }

    pub(crate) fn payload_size(&self) -> PayloadSize {
        self.payload_size
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    fn give_up(&mut self, size: u64, max_size: u64) -> ParseError {
        warn!(size, max_size, "request entity too large");
        self.finished = true;
        // the sender may be blocked on a full data channel, it sees the close instead
        let _ = self.signal_sender.try_send(BodyRequestSignal::Enough);
        self.data_receiver.close();
        ParseError::entity_too_large(size, max_size)
    }

    fn check_limit(&mut self, size: u64) -> Result<(), ParseError> {
        match self.limit {
            Some(max_size) if size > max_size => Err(self.give_up(size, max_size)),
            _ => Ok(()),
        }
    }
}

impl Body for BodyReceiver {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(None);
        }

        if this.received == 0 && !this.in_flight {
            if let Some(declared) = this.payload_size.length() {
                if let Err(e) = this.check_limit(declared) {
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }

        if !this.in_flight {
            match Pin::new(&mut this.signal_sender).poll_ready(cx) {
                Poll::Ready(Ok(())) => {
                    if let Err(e) = Pin::new(&mut this.signal_sender).start_send(BodyRequestSignal::RequestData) {
                        error!(cause = %e, "failed to request body data");
                        this.finished = true;
                        return Poll::Ready(Some(Err(ParseError::invalid_body("failed to send signal when receive body data"))));
                    }
                    this.in_flight = true;
                }
                Poll::Ready(Err(e)) => {
                    error!(cause = %e, "failed to prepare body data request");
                    this.finished = true;
                    return Poll::Ready(Some(Err(ParseError::invalid_body("failed to send signal when receive body data"))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        match this.data_receiver.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(PayloadItem::Chunk(bytes)))) => {
                this.in_flight = false;
                this.received += bytes.len() as u64;
                if let Err(e) = this.check_limit(this.received) {
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(Some(Ok(Frame::data(bytes))))
            }
            Poll::Ready(Some(Ok(PayloadItem::Eof))) => {
                this.in_flight = false;
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.in_flight = false;
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.in_flight = false;
                this.finished = true;
                Poll::Ready(Some(Err(ParseError::invalid_body("body stream should not receive None when receive data"))))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished
    }

    fn size_hint(&self) -> SizeHint {
        self.payload_size.into()
    }
}

impl From<SizeHint> for PayloadSize {
    fn from(size_hint: SizeHint) -> Self {
        match size_hint.exact() {
            Some(length) => PayloadSize::new_length(length),
            None => PayloadSize::new_chunked(),
        }
    }
}

impl From<PayloadSize> for SizeHint {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(length) => SizeHint::with_exact(length),
            PayloadSize::Chunked | PayloadSize::Identity => SizeHint::new(),
            PayloadSize::Empty => SizeHint::with_exact(0),
        }
    }
}
