//! Data-entry forms
//!
//! Actions describe their intake form as an ordered list of entries; the
//! platform can show at most [`MODAL_FIELDS_MAX`] fields per step, so
//! longer forms are paginated and each step must complete before the next
//! is shown. Submitted values are validated against the entry constraints
//! and flattened back into entry order.

use std::time::Duration;

use crate::config::{FormEntry, PanelAction};
use crate::error::{Result, TicketDeskError};
use crate::flows::TicketEngine;
use crate::platform::events::InboundEvent;
use crate::platform::{
    ChannelId, Control, ControlId, ControlStyle, Field, OutboundMessage, Section, UserId,
};

/// Window for asynchronous form collection
pub const FORM_COLLECT_WINDOW: Duration = Duration::from_secs(48 * 60 * 60);

/// Maximum form fields the platform renders per step
pub const MODAL_FIELDS_MAX: usize = 5;

/// One step of a paginated form
#[derive(Debug, Clone, Copy)]
pub struct FormPage<'a> {
    /// 1-based step number
    pub number: usize,
    pub total: usize,
    /// Index of the first entry of this page within the full form
    pub offset: usize,
    pub entries: &'a [FormEntry],
}

/// Splits a form into steps of at most [`MODAL_FIELDS_MAX`] entries
#[derive(Debug, Clone, Copy)]
pub struct FormPager<'a> {
    entries: &'a [FormEntry],
}

impl<'a> FormPager<'a> {
    #[must_use]
    pub const fn new(entries: &'a [FormEntry]) -> Self {
        Self { entries }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.entries.len().div_ceil(MODAL_FIELDS_MAX)
    }

    /// Iterate the form's steps in order
    pub fn pages(&self) -> impl Iterator<Item = FormPage<'a>> {
        let total = self.page_count();
        self.entries
            .chunks(MODAL_FIELDS_MAX)
            .enumerate()
            .map(move |(i, entries)| FormPage {
                number: i + 1,
                total,
                offset: i * MODAL_FIELDS_MAX,
                entries,
            })
    }
}

/// Submitted form values, flattened across steps into entry order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormResponse {
    pub values: Vec<String>,
}

impl FormResponse {
    /// Trimmed, non-empty value at an entry index
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&str> {
        self.values
            .get(index)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Validate one submitted step against its entries
pub fn validate_page(entries: &[FormEntry], values: &[String]) -> Result<()> {
    if values.len() != entries.len() {
        return Err(TicketDeskError::FormInvalid {
            message: format!(
                "expected {} values, received {}",
                entries.len(),
                values.len()
            ),
        });
    }
    for (entry, value) in entries.iter().zip(values) {
        let value = value.trim();
        if value.is_empty() {
            if entry.required {
                return Err(TicketDeskError::FormInvalid {
                    message: format!("`{}` is required", entry.label),
                });
            }
            continue;
        }
        if let Some(min) = entry.min_length {
            if value.chars().count() < min {
                return Err(TicketDeskError::FormInvalid {
                    message: format!("`{}` must be at least {min} characters", entry.label),
                });
            }
        }
        if let Some(max) = entry.max_length {
            if value.chars().count() > max {
                return Err(TicketDeskError::FormInvalid {
                    message: format!("`{}` must be at most {max} characters", entry.label),
                });
            }
        }
    }
    Ok(())
}

impl TicketEngine {
    /// Collect the action's form from `respondent` in `channel`.
    ///
    /// One prompt per step; each step waits (bounded) for a submission
    /// whose form id matches before the next is shown. The prompt carries
    /// the entry labels and any prefilled identity value so the
    /// integration layer can construct the platform form.
    pub(crate) async fn collect_form(
        &self,
        channel: &ChannelId,
        respondent: &UserId,
        form_id: &str,
        action: &PanelAction,
        prefill_steam: Option<&str>,
    ) -> Result<FormResponse> {
        let pager = FormPager::new(&action.form_entries);
        if pager.is_empty() {
            return Ok(FormResponse::default());
        }

        let mut values = Vec::with_capacity(action.form_entries.len());
        for page in pager.pages() {
            let page_form_id = format!("{form_id}@{}", page.number);
            let prompt = self.form_prompt(respondent, &page, &page_form_id, prefill_steam);
            self.platform().send(channel, prompt).await?;

            let mut collector = self.events().collector();
            let submitted = collector
                .next(FORM_COLLECT_WINDOW, |event| {
                    matches!(
                        event,
                        InboundEvent::FormSubmit {
                            channel: c,
                            user,
                            form_id: id,
                            ..
                        } if c == channel && user == respondent && id == &page_form_id
                    )
                })
                .await
                .ok_or(TicketDeskError::FormTimeout)?;

            let InboundEvent::FormSubmit {
                values: step_values,
                ..
            } = submitted
            else {
                return Err(TicketDeskError::FormTimeout);
            };
            validate_page(page.entries, &step_values)?;
            values.extend(step_values);
        }

        Ok(FormResponse { values })
    }

    fn form_prompt(
        &self,
        respondent: &UserId,
        page: &FormPage<'_>,
        page_form_id: &str,
        prefill_steam: Option<&str>,
    ) -> OutboundMessage {
        let step = if page.total > 1 {
            format!(" (step {}/{})", page.number, page.total)
        } else {
            String::new()
        };
        let mut fields: Vec<Field> = page
            .entries
            .iter()
            .map(|e| {
                let mut value = if e.required { "required" } else { "optional" }.to_string();
                if e.is_steam_id {
                    if let Some(prefill) = prefill_steam {
                        value = format!("{value}, on file: {prefill}");
                    }
                }
                Field::new(e.label.clone(), value)
            })
            .collect();
        if let Some(placeholder) = page.entries.iter().find_map(|e| e.placeholder.as_deref()) {
            fields.push(Field::new("Hint", placeholder));
        }

        OutboundMessage::text(format!(
            "<@{respondent}>, please provide the following information to continue{step}:"
        ))
        .with_sections(vec![Section {
            title: None,
            body: None,
            fields,
        }])
        .with_controls(vec![Control::button(
            ControlId::collect_form(page_form_id),
            "Provide Form Details",
            Some("✏️"),
            ControlStyle::Success,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str, required: bool) -> FormEntry {
        FormEntry {
            label: label.into(),
            required,
            is_long: false,
            is_steam_id: false,
            min_length: None,
            max_length: None,
            placeholder: None,
        }
    }

    #[test]
    fn test_pager_splits_at_field_limit() {
        let entries: Vec<FormEntry> = (0..12).map(|i| entry(&format!("q{i}"), false)).collect();
        let pager = FormPager::new(&entries);
        assert_eq!(pager.page_count(), 3);

        let pages: Vec<_> = pager.pages().collect();
        assert_eq!(pages[0].entries.len(), 5);
        assert_eq!(pages[1].entries.len(), 5);
        assert_eq!(pages[2].entries.len(), 2);
        assert_eq!(pages[2].offset, 10);
        assert_eq!(pages[2].number, 3);
    }

    #[test]
    fn test_single_page_for_short_forms() {
        let entries = vec![entry("a", true), entry("b", false)];
        let pager = FormPager::new(&entries);
        assert_eq!(pager.page_count(), 1);
    }

    #[test]
    fn test_validate_required_and_lengths() {
        let mut e = entry("Steam64", true);
        e.min_length = Some(17);
        e.max_length = Some(17);
        let entries = vec![e, entry("Details", false)];

        assert!(validate_page(&entries, &["76561198000000000".into(), String::new()]).is_ok());

        let err = validate_page(&entries, &[String::new(), String::new()]).unwrap_err();
        assert!(matches!(err, TicketDeskError::FormInvalid { .. }));

        let err = validate_page(&entries, &["123".into(), String::new()]).unwrap_err();
        assert!(err.to_string().contains("at least"));

        let err =
            validate_page(&entries, &["765611980000000001234".into(), String::new()]).unwrap_err();
        assert!(err.to_string().contains("at most"));
    }

    #[test]
    fn test_validate_value_count() {
        let entries = vec![entry("a", false)];
        assert!(validate_page(&entries, &[]).is_err());
    }

    #[test]
    fn test_response_value_trims_and_filters() {
        let response = FormResponse {
            values: vec!["  x  ".into(), "   ".into()],
        };
        assert_eq!(response.value(0), Some("x"));
        assert_eq!(response.value(1), None);
        assert_eq!(response.value(2), None);
    }
}
