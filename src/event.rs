//! Reminder events built from invoices, and their Calendar API request body

use crate::invoice::{Invoice, Vendor};
use chrono::{Days, NaiveDate};
use serde::Serialize;

/// Minutes before the event at which each reminder fires
const REMINDER_MINUTES: [u32; 2] = [24 * 60, 30];

/// A payment reminder: one all-day-long slot on the due date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderEvent {
    pub title: String,
    pub description: String,
    pub start: NaiveDate,
}

impl ReminderEvent {
    /// Build the reminder for an invoice: titled after the vendor, listing the
    /// payment fields one per line, starting on the due date.
    pub fn from_invoice(vendor: Vendor, invoice: &Invoice) -> Self {
        let mut fields = vec![
            ("REFERÊNCIA", invoice.reference.clone()),
            ("ENTIDADE", invoice.entity.clone()),
            ("MONTANTE", invoice.amount.clone()),
            ("DATA LIMITE", format_day(invoice.due_date)),
        ];
        if let Some(next) = invoice.next_reading_date {
            fields.push(("PRÓXIMA LEITURA", format_day(next)));
        }

        let description = fields
            .iter()
            .map(|(key, value)| format!("{key}: {value}\n"))
            .collect();

        Self {
            title: format!("Fatura {}", vendor.display_name()),
            description,
            start: invoice.due_date,
        }
    }

    /// Calendar API `Event` resource for this reminder
    pub fn to_request(&self, time_zone: &str) -> EventRequest {
        let end = self.start.checked_add_days(Days::new(1)).unwrap_or(self.start);
        let reminders = REMINDER_MINUTES
            .iter()
            .flat_map(|&minutes| {
                [
                    ReminderOverride { method: "email", minutes },
                    ReminderOverride { method: "popup", minutes },
                ]
            })
            .collect();

        EventRequest {
            summary: self.title.clone(),
            description: self.description.clone(),
            start: EventDateTime::midnight(self.start, time_zone),
            end: EventDateTime::midnight(end, time_zone),
            reminders: Reminders {
                use_default: false,
                overrides: reminders,
            },
        }
    }
}

fn format_day(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct EventRequest {
    pub summary: String,
    pub description: String,
    pub start: EventDateTime,
    pub end: EventDateTime,
    pub reminders: Reminders,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    pub date_time: String,
    pub time_zone: String,
}

impl EventDateTime {
    fn midnight(date: NaiveDate, time_zone: &str) -> Self {
        Self {
            date_time: date.format("%Y-%m-%dT00:00:00+00:00").to_string(),
            time_zone: time_zone.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminders {
    pub use_default: bool,
    pub overrides: Vec<ReminderOverride>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderOverride {
    pub method: &'static str,
    pub minutes: u32,
}
