//! Purchasing domain module (expense intake).
//!
//! Business rules for expenses: inventory-type expenses may receive stock,
//! and their structure is frozen once recorded. Deterministic domain logic
//! only (no IO, no HTTP, no storage).

pub mod expense;

pub use expense::{
    Expense, ExpenseCommand, ExpenseEvent, ExpenseId, ExpenseKind, ExpenseLine, ExpenseLineInput,
    ExpenseRecorded, ExpenseRevised, LineRevision, RecordExpense, ReviseExpense,
};
