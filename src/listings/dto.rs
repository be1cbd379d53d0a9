use serde::Deserialize;

use super::model::ListingStatus;
use crate::{
    error::{AppError, FieldError},
    store::{ListingPatch, NewListing},
    users::dto::{non_blank, required},
};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateListingRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub image_url: Option<String>,
}

/// Draft edits. Status, owner and admin notes are not editable here.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateListingRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub image_url: Option<String>,
}

/// Optional body of validate/refuse.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    pub admin_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListingFilter {
    pub status: Option<ListingStatus>,
}

fn checked_price(price: f64, errors: &mut Vec<FieldError>) -> Option<f64> {
    if price.is_finite() && price > 0.0 {
        Some(price)
    } else {
        errors.push(FieldError::new("price", "must be a positive number"));
        None
    }
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl CreateListingRequest {
    pub fn validate(self, seller_id: i64) -> Result<NewListing, AppError> {
        let mut errors = Vec::new();
        let title = required("title", self.title, &mut errors);
        let description = required("description", self.description, &mut errors);
        let price = match self.price {
            Some(p) => checked_price(p, &mut errors),
            None => {
                errors.push(FieldError::new("price", "is required"));
                None
            }
        };

        match (title, description, price) {
            (Some(title), Some(description), Some(price)) if errors.is_empty() => Ok(NewListing {
                seller_id,
                title,
                description,
                price,
                image_url: optional_text(self.image_url),
            }),
            _ => Err(AppError::Validation(errors)),
        }
    }
}

impl UpdateListingRequest {
    pub fn validate(self) -> Result<ListingPatch, AppError> {
        let mut errors = Vec::new();
        let title = non_blank("title", self.title, &mut errors);
        let description = non_blank("description", self.description, &mut errors);
        let price = self.price.and_then(|p| checked_price(p, &mut errors));
        let image_url = optional_text(self.image_url);

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }
        if title.is_none() && description.is_none() && price.is_none() && image_url.is_none() {
            return Err(AppError::invalid("body", "no editable field provided"));
        }
        Ok(ListingPatch {
            title,
            description,
            price,
            image_url,
            ..ListingPatch::default()
        })
    }
}

impl ReviewRequest {
    pub fn notes(self) -> Option<String> {
        optional_text(self.admin_notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_title_description_and_positive_price() {
        let err = CreateListingRequest {
            title: Some("Chair".into()),
            description: None,
            price: Some(0.0),
            image_url: None,
        }
        .validate(1)
        .unwrap_err();
        let AppError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        let names: Vec<_> = fields.iter().map(|f| f.field).collect();
        assert_eq!(names, vec!["description", "price"]);
    }

    #[test]
    fn create_rejects_non_finite_price() {
        let req = CreateListingRequest {
            title: Some("Chair".into()),
            description: Some("Walnut".into()),
            price: Some(f64::NAN),
            image_url: None,
        };
        assert!(req.validate(1).is_err());
    }

    #[test]
    fn create_trims_and_drops_blank_image() {
        let new = CreateListingRequest {
            title: Some("  Chair ".into()),
            description: Some("Walnut".into()),
            price: Some(80.5),
            image_url: Some("  ".into()),
        }
        .validate(4)
        .unwrap();
        assert_eq!(new.title, "Chair");
        assert_eq!(new.seller_id, 4);
        assert_eq!(new.image_url, None);
    }

    #[test]
    fn update_needs_something_to_change() {
        assert!(UpdateListingRequest::default().validate().is_err());
        let patch = UpdateListingRequest {
            price: Some(12.0),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(patch.price, Some(12.0));
        assert_eq!(patch.status, None);
    }

    #[test]
    fn update_cannot_smuggle_status() {
        let res = serde_json::from_str::<UpdateListingRequest>(r#"{"status":"APPROVED"}"#);
        assert!(res.is_err());
    }
}
