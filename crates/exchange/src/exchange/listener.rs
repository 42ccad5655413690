//! Exchange lifecycle listeners.
//!
//! Completion listeners run in reverse registration order. Each one receives a
//! [`NextListener`] and has to call [`NextListener::proceed`] for the listeners registered
//! before it to run, which lets a listener wrap the rest of the completion like a
//! `try`/`finally` block. When the chain is exhausted the exchange is marked as completed.

use super::HttpServerExchange;

/// Notified once both the request and the response of an exchange are terminated.
pub trait ExchangeCompletionListener: Send {
    fn exchange_event(self: Box<Self>, exchange: &mut HttpServerExchange, next: NextListener);
}

impl<F> ExchangeCompletionListener for F
where
    F: FnOnce(&mut HttpServerExchange, NextListener) + Send,
{
    fn exchange_event(self: Box<Self>, exchange: &mut HttpServerExchange, next: NextListener) {
        (*self)(exchange, next);
    }
}

/// The remaining completion listeners of an exchange.
#[must_use = "the remaining listeners only run if `proceed` is called"]
pub struct NextListener {
    remaining: Vec<Box<dyn ExchangeCompletionListener>>,
}

impl std::fmt::Debug for NextListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextListener").field("remaining", &self.remaining.len()).finish()
    }
}

impl NextListener {
    pub(crate) fn new(remaining: Vec<Box<dyn ExchangeCompletionListener>>) -> Self {
        Self { remaining }
    }

    /// Runs the next listener, or completes the exchange when none is left.
    pub fn proceed(mut self, exchange: &mut HttpServerExchange) {
        match self.remaining.pop() {
            Some(listener) => listener.exchange_event(exchange, self),
            None => exchange.notify_completed(),
        }
    }
}

/// Runs right before the response head is frozen, in registration order.
pub type ResponseCommitListener = Box<dyn FnOnce(&mut HttpServerExchange) + Send>;

/// Consulted, latest first, when an exchange ends before its response started.
///
/// Returning true means the listener produced the response (usually through
/// [`HttpServerExchange::set_response_body`]) and the remaining listeners are skipped.
pub type DefaultResponseListener = Box<dyn FnMut(&mut HttpServerExchange) -> bool + Send>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn completion_listeners_unwind_in_reverse() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut exchange = HttpServerExchange::default();

        for name in ["l1", "l2", "l3"] {
            let events = Arc::clone(&events);
            exchange.add_exchange_complete_listener(move |exchange: &mut HttpServerExchange, next: NextListener| {
                events.lock().unwrap().push(format!("{name} before"));
                next.proceed(exchange);
                events.lock().unwrap().push(format!("{name} after"));
            });
        }

        exchange.terminate_request();
        assert!(events.lock().unwrap().is_empty());
        exchange.terminate_response();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["l3 before", "l2 before", "l1 before", "l1 after", "l2 after", "l3 after"]
        );
        assert!(exchange.is_complete());
        assert!(exchange.is_completion_notified());

        // terminating again doesn't run the chain twice
        exchange.terminate_request();
        exchange.terminate_response();
        assert_eq!(events.lock().unwrap().len(), 6);
    }

    #[test]
    fn listener_can_hold_back_completion() {
        let mut exchange = HttpServerExchange::default();
        exchange.add_exchange_complete_listener(|_: &mut HttpServerExchange, next: NextListener| drop(next));

        exchange.terminate_request();
        exchange.terminate_response();
        assert!(exchange.is_complete());
        assert!(!exchange.is_completion_notified());
    }
}
