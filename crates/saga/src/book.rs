//! The book saga: tracks a book from the moment it is added to the library.
//!
//! ```text
//! Initial ──Added──► Available ──Added──► Available
//! ```
//!
//! Every `Added` copies title, ISBN and the date added onto the instance,
//! so redelivering the same `Added` leaves the instance as it was.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::definition::{DefinitionError, StateMachineDefinition, When};
use crate::event::SagaMessage;
use crate::state::SagaState;

/// Saga type tag for book instances.
pub const SAGA_TYPE: &str = "Book";

/// States of a book instance.
///
/// Stored by name; renaming a variant's name orphans stored instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookState {
    /// Not yet added.
    Initial,

    /// In the library's collection.
    Available,
}

impl SagaState for BookState {
    fn name(&self) -> &'static str {
        match self {
            BookState::Initial => "Initial",
            BookState::Available => "Available",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "Initial" => Some(BookState::Initial),
            "Available" => Some(BookState::Available),
            _ => None,
        }
    }
}

impl std::fmt::Display for BookState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Domain fields of a book instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    title: Option<String>,
    isbn: Option<String>,
    date_added: Option<NaiveDate>,
}

impl Book {
    /// Returns the title, if the book was added.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Returns the ISBN, if the book was added.
    pub fn isbn(&self) -> Option<&str> {
        self.isbn.as_deref()
    }

    /// Returns the calendar date the book was added.
    pub fn date_added(&self) -> Option<NaiveDate> {
        self.date_added
    }
}

/// A book was added to the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookAdded {
    pub book_id: String,
    pub title: String,
    pub isbn: String,
    pub timestamp: DateTime<Utc>,
}

impl SagaMessage for BookAdded {
    const EVENT_TYPE: &'static str = "Added";
}

impl BookAdded {
    /// Creates a new BookAdded message stamped with the current time.
    pub fn new(book_id: impl Into<String>, title: impl Into<String>, isbn: impl Into<String>) -> Self {
        Self {
            book_id: book_id.into(),
            title: title.into(),
            isbn: isbn.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Copies the message's data onto the book.
pub fn copy_data_to_instance(mut book: Book, added: &BookAdded) -> Book {
    book.date_added = Some(added.timestamp.date_naive());
    book.title = Some(added.title.clone());
    book.isbn = Some(added.isbn.clone());
    book
}

/// Builds the book state machine.
pub fn book_state_machine() -> Result<StateMachineDefinition<BookState, Book>, DefinitionError> {
    StateMachineDefinition::builder(SAGA_TYPE, BookState::Initial)
        .state(BookState::Available)
        .event_correlated_by::<BookAdded>("book_id")
        .initially(
            When::new()
                .then(copy_data_to_instance)
                .transition_to(BookState::Available),
        )
        .during_any(When::new().then(copy_data_to_instance))
        .build()
}
