//! Aggregates over an emitted feed

use std::collections::HashMap;

use serde::Serialize;

use crate::models::{Transaction, TransactionKind};

/// Totals a sink can derive from one emission without re-walking the feed
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedSummary {
    pub count: usize,
    pub total_expenses: f64,
    pub total_income: f64,
    /// Percentage of income left after expenses; `None` without income
    pub savings_rate: Option<f64>,
    /// Expense totals per category
    pub by_category: HashMap<String, f64>,
}

impl FeedSummary {
    pub fn from_feed(transactions: &[Transaction]) -> Self {
        let mut summary = Self {
            count: transactions.len(),
            ..Self::default()
        };

        for tx in transactions {
            match tx.kind {
                TransactionKind::Expense => {
                    summary.total_expenses += tx.amount;
                    *summary.by_category.entry(tx.category.clone()).or_insert(0.0) += tx.amount;
                }
                TransactionKind::Income => summary.total_income += tx.amount,
            }
        }

        if summary.total_income > 0.0 {
            summary.savings_rate = Some(
                (summary.total_income - summary.total_expenses) / summary.total_income * 100.0,
            );
        }
        summary
    }
}
