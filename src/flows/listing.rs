use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::User;
use crate::config::Config;
use crate::forms::{
    FieldDescriptor, FieldKind, FieldValue, FormDescriptor, FormState, Rule, StepDescriptor,
};
use crate::staging::StagingLimits;
use crate::submission::{Commit, Committed, PersistMode, SubmissionError, UploadTarget};

use super::{non_empty, signed_in, split_tags, to_record, FlowSpec, Route};

pub const CATEGORIES: [&str; 11] = [
    "Books",
    "Electronics",
    "Hostel Essentials",
    "Clothing",
    "Sports / Hobbies",
    "Digital Files",
    "Services",
    "Rental Items",
    "Event Tickets",
    "Free Items",
    "Others",
];

pub const CONDITIONS: [&str; 4] = ["New", "Like New", "Used - Good", "Used - Acceptable"];

const PUBLIC_PREFIX: &str = "public/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOption {
    Pickup,
    Delivery,
    Digital,
}

impl DeliveryOption {
    pub const ALL: [&'static str; 3] = ["pickup", "delivery", "digital"];

    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOption::Pickup => "Campus Pickup",
            DeliveryOption::Delivery => "Hostel Delivery",
            DeliveryOption::Digital => "Digital Delivery",
        }
    }
}

impl FromStr for DeliveryOption {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pickup" => Ok(DeliveryOption::Pickup),
            "delivery" => Ok(DeliveryOption::Delivery),
            "digital" => Ok(DeliveryOption::Digital),
            other => Err(format!("unknown delivery option `{}`", other)),
        }
    }
}

impl fmt::Display for DeliveryOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Row written to the listings table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub user_id: String,
    pub name: String,
    pub category: String,
    pub condition: String,
    pub condition_notes: Option<String>,
    pub price: f64,
    pub description: String,
    pub tags: Vec<String>,
    pub hostel: Option<String>,
    pub delivery_option: DeliveryOption,
    pub is_digital: bool,
    pub is_free: bool,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ListingRecord {
    /// Coerces validated form values into a listing row.
    pub fn from_form(
        values: &FormState,
        images: &[String],
        user_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SubmissionError> {
        let is_free = values.flag("isFree");
        let price = if is_free {
            0.0
        } else {
            match values.get("price") {
                Some(FieldValue::Number(amount)) => *amount,
                Some(FieldValue::Text(text)) => text
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| SubmissionError::Invalid("price is not a number".into()))?,
                _ => return Err(SubmissionError::Invalid("price is not a number".into())),
            }
        };
        let delivery_option = values
            .text("deliveryOption")
            .parse::<DeliveryOption>()
            .map_err(SubmissionError::Invalid)?;
        Ok(Self {
            user_id: user_id.to_string(),
            name: values.text("itemName").trim().to_string(),
            category: values.text("category").to_string(),
            condition: values.text("condition").to_string(),
            condition_notes: non_empty(values.text("conditionNotes")),
            price,
            description: values.text("description").trim().to_string(),
            tags: split_tags(values.text("tags")),
            hostel: non_empty(values.text("hostel")),
            delivery_option,
            is_digital: values.flag("isDigital"),
            is_free,
            images: images.to_vec(),
            created_at,
        })
    }
}

/// Three-step item listing wizard with up to `max_listing_images` photos.
pub struct ListingFlow {
    descriptor: Arc<FormDescriptor>,
    bucket: String,
    table: String,
    limits: StagingLimits,
}

impl ListingFlow {
    pub fn new(config: &Config) -> Self {
        Self {
            descriptor: Arc::new(listing_descriptor()),
            bucket: config.listing_bucket.clone(),
            table: config.listings_table.clone(),
            limits: StagingLimits {
                max_count: config.max_listing_images,
                max_bytes: config.max_image_bytes,
            },
        }
    }
}

fn listing_descriptor() -> FormDescriptor {
    let details = StepDescriptor::new(
        "details",
        "Item Details",
        vec![
            FieldDescriptor::new("itemName", "Item name", FieldKind::Text)
                .rule(Rule::Required, "Item name is required"),
            FieldDescriptor::new("category", "Category", FieldKind::Choice(CATEGORIES.to_vec()))
                .rule(Rule::Required, "Category is required")
                .rule(Rule::OneOf(CATEGORIES.to_vec()), "Category is required"),
            FieldDescriptor::new("condition", "Condition", FieldKind::Choice(CONDITIONS.to_vec()))
                .rule(Rule::Required, "Condition is required")
                .rule(Rule::OneOf(CONDITIONS.to_vec()), "Condition is required"),
            FieldDescriptor::new("conditionNotes", "Condition notes", FieldKind::Text)
                .with_help("e.g., Minor scratches on screen"),
            FieldDescriptor::new("isFree", "Offer for free", FieldKind::Flag).with_default(false),
            FieldDescriptor::new("price", "Price (₹)", FieldKind::Number)
                .rule(Rule::RequiredUnless("isFree"), "Price is required unless free")
                .rule(
                    Rule::Numeric {
                        waived_by: Some("isFree"),
                    },
                    "Price must be a valid amount",
                ),
            FieldDescriptor::new("tags", "Tags", FieldKind::Text)
                .with_help("Comma separated, e.g. calculator, engineering"),
            FieldDescriptor::new("description", "Description", FieldKind::LongText)
                .rule(Rule::Required, "Description is required"),
        ],
    );
    let delivery = StepDescriptor::new(
        "delivery",
        "Delivery & Location",
        vec![
            FieldDescriptor::new(
                "deliveryOption",
                "Delivery option",
                FieldKind::Choice(DeliveryOption::ALL.to_vec()),
            )
            .rule(Rule::Required, "Delivery option is required")
            .rule(
                Rule::OneOf(DeliveryOption::ALL.to_vec()),
                "Delivery option is required",
            ),
            FieldDescriptor::new("hostel", "Hostel / location", FieldKind::Text),
        ],
    );
    let options = StepDescriptor::new(
        "options",
        "Additional Options",
        vec![FieldDescriptor::new("isDigital", "Digital item", FieldKind::Flag).with_default(false)],
    );
    FormDescriptor::new("listing", vec![details, delivery, options])
}

#[async_trait]
impl FlowSpec for ListingFlow {
    fn descriptor(&self) -> Arc<FormDescriptor> {
        self.descriptor.clone()
    }

    fn staging_limits(&self) -> Option<StagingLimits> {
        Some(self.limits)
    }

    fn upload_target(&self, _user: Option<&User>) -> Option<UploadTarget> {
        Some(UploadTarget {
            bucket: self.bucket.clone(),
            key_prefix: PUBLIC_PREFIX.to_string(),
        })
    }

    fn commit(
        &self,
        values: &FormState,
        uploads: &[String],
        user: Option<&User>,
    ) -> Result<Commit, SubmissionError> {
        let user = signed_in(user)?;
        let record = ListingRecord::from_form(values, uploads, &user.id, Utc::now())?;
        Ok(Commit::Record {
            table: self.table.clone(),
            label: "listing",
            mode: PersistMode::Insert,
            record: to_record(&record)?,
        })
    }

    fn route_after(&self, _values: &FormState, _committed: &Committed) -> Route {
        Route::Listings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::{StepEvent, WizardSession};
    use chrono::TimeZone;

    fn filled() -> FormState {
        let mut values = listing_descriptor().initial_state();
        values.set("itemName", "Scientific Calculator");
        values.set("category", "Electronics");
        values.set("condition", "Like New");
        values.set("price", "500");
        values.set("description", "Casio fx-991");
        values.set("deliveryOption", "pickup");
        values
    }

    #[test]
    fn blank_item_name_blocks_first_step() {
        let flow = ListingFlow::new(&Config::default());
        let mut session = WizardSession::new(flow.descriptor());
        session.set_field("itemName", "").unwrap();
        session.set_field("category", "Books").unwrap();
        session.set_field("condition", "New").unwrap();
        session.set_field("price", "10").unwrap();
        session.set_field("description", "x").unwrap();

        assert_eq!(session.advance(), StepEvent::Blocked);
        assert_eq!(
            session.errors().iter().collect::<Vec<_>>(),
            vec![("itemName", "Item name is required")]
        );
    }

    #[test]
    fn free_items_skip_price() {
        let flow = ListingFlow::new(&Config::default());
        let mut session = WizardSession::new(flow.descriptor());
        session.set_field("itemName", "Old notes").unwrap();
        session.set_field("category", "Free Items").unwrap();
        session.set_field("condition", "Used - Good").unwrap();
        session.set_field("isFree", true).unwrap();
        session.set_field("description", "Semester 1 notes").unwrap();
        assert_eq!(session.advance(), StepEvent::Moved { from: 0, to: 1 });
    }

    #[test]
    fn unknown_category_is_refused() {
        let flow = ListingFlow::new(&Config::default());
        let mut session = WizardSession::new(flow.descriptor());
        session.set_field("category", "Weapons").unwrap();
        assert_eq!(session.errors().get("category"), Some("Category is required"));
    }

    #[test]
    fn record_coerces_form_values() {
        let mut values = filled();
        values.set("tags", "calculator, casio , ");
        values.set("conditionNotes", "  ");
        values.set("hostel", "Block C");
        let created = Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap();
        let record =
            ListingRecord::from_form(&values, &["https://cdn/a.png".to_string()], "u1", created)
                .unwrap();
        assert_eq!(record.price, 500.0);
        assert_eq!(record.tags, vec!["calculator", "casio"]);
        assert_eq!(record.condition_notes, None);
        assert_eq!(record.hostel.as_deref(), Some("Block C"));
        assert_eq!(record.delivery_option, DeliveryOption::Pickup);
        assert_eq!(record.images.len(), 1);
        assert!(!record.is_free);
    }

    #[test]
    fn free_listing_has_zero_price() {
        let mut values = filled();
        values.set("isFree", true);
        values.set("price", "");
        let record = ListingRecord::from_form(&values, &[], "u1", Utc::now()).unwrap();
        assert_eq!(record.price, 0.0);
        assert!(record.is_free);
    }

    #[test]
    fn numeric_price_is_taken_as_is() {
        let mut values = filled();
        values.set("price", 10.0);
        let record = ListingRecord::from_form(&values, &[], "u1", Utc::now()).unwrap();
        assert_eq!(record.price, 10.0);
    }

    #[test]
    fn record_serializes_with_table_column_names() {
        let record = ListingRecord::from_form(&filled(), &[], "u1", Utc::now()).unwrap();
        let row = to_record(&record).unwrap();
        assert_eq!(row.get("delivery_option"), Some(&serde_json::json!("pickup")));
        assert_eq!(row.get("condition_notes"), Some(&serde_json::Value::Null));
        assert!(row.contains_key("created_at"));
        assert!(row.contains_key("is_digital"));
    }

    #[test]
    fn commit_requires_a_user() {
        let flow = ListingFlow::new(&Config::default());
        let err = flow.commit(&filled(), &[], None).unwrap_err();
        assert_eq!(err, SubmissionError::AuthRequired);
    }
}
