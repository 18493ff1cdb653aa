//! Deterministic in-memory DOM harness for testing form-driven CRUD logic.
//!
//! A [`Harness`] owns a [`Dom`] tree, the listeners bound to its elements, a
//! logical [`AsyncClock`], a stubbed network and a few platform mocks such as
//! `confirm`. Nothing touches wall-clock time: timed continuations only run when
//! the test advances the clock.
//!
//! ```no_run
//! use form_harness::{Harness, ProductForm, Result};
//!
//! fn demo() -> Result<()> {
//!     let mut h = Harness::with_fixture()?;
//!     let form = ProductForm::new();
//!     form.mount(&mut h)?;
//!     h.type_text("#nombre", "Mazda 3")?;
//!     h.type_text("#precio", "30000")?;
//!     h.click("button")?;
//!     h.advance(800)?;
//!     h.assert_row_count("#tabla-productos tbody tr", 1)?;
//!     Ok(())
//! }
//! ```

use std::error::Error as StdError;
use std::fmt;

mod clock;
mod config;
mod core_dom_utils;
mod crud;
mod dom;
mod element;
mod events;
mod fixture;
mod harness;
mod network;
mod runner;
mod runtime_state;
mod selector;

pub use clock::{
    AsyncClock, DueTimer, PendingTimer, SETTLED_STATE_RETENTION, TimerHandle, TimerHost,
    TimerState,
};
pub use config::HarnessConfig;
pub use core_dom_utils::{format_float, parse_float};
pub use crud::{FormState, Product, ProductCrud, ProductForm, ProductRecord};
pub use dom::Dom;
pub use element::ElementHandle;
pub use events::{Event, EventListener, ListenerId};
pub use fixture::{
    DESCRIPCION_ID, MESSAGE_ID, NOMBRE_ID, PRECIO_ID, PRODUCT_ROWS_SELECTOR, SAVE_BUTTON_ID,
    TABLE_ID,
};
pub use harness::{Harness, TimerCallback};
pub use network::{Backend, FetchRequest, FetchResponse, Method, ProductBackend};
pub use runner::{CheckOutcome, ScenarioContext, ScenarioReport, TestRunner};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidSelector(String),
    DuplicateId(String),
    ClockStarvation {
        steps: usize,
        now_ms: u64,
        pending: usize,
    },
    DetachedNode(String),
    SelectorNotFound(String),
    Json(String),
    Collaborator(String),
    InvalidOperation(String),
    InvalidConfig(String),
    AssertionFailed {
        selector: String,
        expected: String,
        actual: String,
        dom_snippet: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSelector(selector) => write!(f, "invalid selector: {selector}"),
            Self::DuplicateId(id) => write!(f, "duplicate element id: {id}"),
            Self::ClockStarvation {
                steps,
                now_ms,
                pending,
            } => write!(
                f,
                "clock starvation after {steps} steps (now_ms={now_ms}, pending_timers={pending})"
            ),
            Self::DetachedNode(node) => write!(f, "element is no longer in the document: {node}"),
            Self::SelectorNotFound(selector) => write!(f, "selector not found: {selector}"),
            Self::Json(msg) => write!(f, "json error: {msg}"),
            Self::Collaborator(msg) => write!(f, "collaborator error: {msg}"),
            Self::InvalidOperation(msg) => write!(f, "invalid operation: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::AssertionFailed {
                selector,
                expected,
                actual,
                dom_snippet,
            } => write!(
                f,
                "assertion failed for {selector}: expected {expected}, actual {actual}, snippet {dom_snippet}"
            ),
        }
    }
}

impl StdError for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
