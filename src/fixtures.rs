//! Generated input data for one workflow run
//!
//! Names and emails carry a run stamp so repeated runs against the same CRM
//! never collide with records left behind by earlier runs.

use crate::extract::Amount;
use chrono::{Duration, Local, NaiveDate};

#[derive(Debug, Clone)]
pub struct NewLead {
    pub name: String,
    pub company: String,
    pub email: String,
    pub phone: String,
    pub status: String,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    pub rate: Amount,
}

impl LineItem {
    pub fn amount(&self) -> Amount {
        self.rate.times(self.quantity)
    }
}

#[derive(Debug, Clone)]
pub struct NewProposal {
    pub subject: String,
    pub date: NaiveDate,
    pub open_till: NaiveDate,
    pub item: LineItem,
}

#[derive(Debug, Clone)]
pub struct NewService {
    pub name: String,
    pub price: Amount,
    pub billing_cycle: String,
}

#[derive(Debug, Clone)]
pub struct NewPrepayment {
    pub amount: Amount,
    pub date: NaiveDate,
    pub mode: String,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub date: NaiveDate,
    pub mode: String,
    pub transaction_id: String,
    pub note: String,
}

/// All generated inputs for a run, derived from one stamp
#[derive(Debug, Clone)]
pub struct TestData {
    pub stamp: String,
    pub today: NaiveDate,
    pub lead: NewLead,
    pub proposal: NewProposal,
    pub service: NewService,
    pub prepayment: NewPrepayment,
    pub payment: NewPayment,
}

impl TestData {
    /// Inputs stamped with the current local time
    pub fn generate() -> Self {
        let now = Local::now();
        Self::with_stamp(&now.format("%Y%m%d%H%M%S").to_string(), now.date_naive())
    }

    pub fn with_stamp(stamp: &str, today: NaiveDate) -> Self {
        let company = format!("E2E Traders {}", stamp);
        let service_price = Amount::from_major(5000);
        let digits: Vec<char> = stamp.chars().filter(char::is_ascii_digit).collect();
        let phone_tail: String = digits[digits.len().saturating_sub(8)..].iter().collect();

        Self {
            stamp: stamp.to_string(),
            today,
            lead: NewLead {
                name: format!("E2E Lead {}", stamp),
                company: company.clone(),
                email: format!("e2e.lead.{}@example.com", stamp),
                phone: format!("98{:0>8}", phone_tail),
                status: "Customer".to_string(),
                source: "Website".to_string(),
            },
            proposal: NewProposal {
                subject: format!("E2E Proposal {}", stamp),
                date: today,
                open_till: today + Duration::days(7),
                item: LineItem {
                    description: "Annual maintenance contract".to_string(),
                    quantity: 1,
                    rate: service_price,
                },
            },
            service: NewService {
                name: format!("E2E AMC {}", stamp),
                price: service_price,
                billing_cycle: "Yearly".to_string(),
            },
            prepayment: NewPrepayment {
                amount: Amount::from_major(1000),
                date: today,
                mode: "Bank".to_string(),
                note: format!("Advance for {}", company),
            },
            payment: NewPayment {
                date: today,
                mode: "Bank".to_string(),
                transaction_id: format!("TXN{}", stamp),
                note: format!("Settlement for {}", company),
            },
        }
    }
}
