use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{quotemodel::ActorRole, requestmodel::BookingMode, workflowmodel::Milestone};

// Service request DTOs
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct CreateServiceRequestDto {
    pub booking_mode: BookingMode,

    #[validate(length(min = 1, max = 100, message = "Category is required"))]
    pub category: String,

    #[validate(length(min = 1, max = 100, message = "Subcategory is required"))]
    pub subcategory: String,

    #[validate(length(min = 1, max = 500, message = "Location is required"))]
    pub location: String,

    pub latitude: Option<f64>,

    pub longitude: Option<f64>,

    pub date: Option<NaiveDate>,

    pub time: Option<String>,

    #[validate(length(max = 200, message = "Title must be at most 200 characters"))]
    pub title: Option<String>,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,

    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// Quote DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SubmitQuoteDto {
    pub price: f64,

    #[validate(length(max = 2000, message = "Message must be at most 2000 characters"))]
    pub message: Option<String>,

    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptQuoteDto {
    pub role: ActorRole,
}

// Agreement DTOs
#[derive(Debug, Serialize, Deserialize)]
pub struct OpenAgreementDto {
    pub quote_id: Uuid,
    pub provider_id: Uuid,
}

// Workflow DTOs
#[derive(Debug, Serialize, Deserialize)]
pub struct AdvanceWorkflowDto {
    pub milestone: Milestone,
}

// Chat DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct PostMessageDto {
    pub receiver_id: Uuid,

    pub quote_id: Option<Uuid>,

    #[validate(length(min = 1, max = 4000, message = "Message must be between 1 and 4000 characters"))]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ThreadQuery {
    pub quote_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_snake_case_and_kebab_modes() {
        let body: CreateServiceRequestDto = serde_json::from_value(serde_json::json!({
            "booking_mode": "quote-only",
            "category": "plumbing",
            "subcategory": "leak",
            "location": "Flat 4, 9 Allen Avenue",
        }))
        .unwrap();

        assert_eq!(body.booking_mode, BookingMode::QuoteOnly);
        assert!(body.date.is_none());
        assert!(body.validate().is_ok());
    }

    #[test]
    fn agreement_body_matches_response_field_names() {
        let quote_id = Uuid::new_v4();
        let provider_id = Uuid::new_v4();
        let body: OpenAgreementDto = serde_json::from_value(serde_json::json!({
            "quote_id": quote_id,
            "provider_id": provider_id,
        }))
        .unwrap();
        assert_eq!(body.quote_id, quote_id);

        let camel = serde_json::from_value::<OpenAgreementDto>(serde_json::json!({
            "quoteId": quote_id,
            "providerId": provider_id,
        }));
        assert!(camel.is_err());
    }

    #[test]
    fn empty_location_fails_validation() {
        let body: CreateServiceRequestDto = serde_json::from_value(serde_json::json!({
            "booking_mode": "immediate",
            "category": "plumbing",
            "subcategory": "leak",
            "location": "",
        }))
        .unwrap();

        assert!(body.validate().is_err());
    }
}
