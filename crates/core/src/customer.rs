use serde::{Deserialize, Serialize};

use crate::form::RawForm;
use crate::schema::{Check, FieldSpec, Schema, ValidationFailure};

pub const NAME_MESSAGE: &str = "Please enter a name.";
pub const EMAIL_MESSAGE: &str = "Please enter a valid email.";
pub const IMAGE_URL_MISSING_MESSAGE: &str = "Please select an image like /customers/evil-rabbit.png";
pub const IMAGE_URL_MESSAGE: &str =
    "String must start with a \"/\" followed by alphanumeric characters (no spaces)";

const NAME: FieldSpec = FieldSpec {
    name: "name",
    missing: NAME_MESSAGE,
    checks: &[(Check::NonEmpty, NAME_MESSAGE)],
};

const EMAIL: FieldSpec = FieldSpec {
    name: "email",
    missing: EMAIL_MESSAGE,
    checks: &[(Check::Email, EMAIL_MESSAGE)],
};

const IMAGE_URL: FieldSpec = FieldSpec {
    name: "imageUrl",
    missing: IMAGE_URL_MISSING_MESSAGE,
    checks: &[(Check::ImagePath, IMAGE_URL_MESSAGE)],
};

/// Validated fields of the create-customer form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerDraft {
    pub name: String,
    pub email: String,
    pub image_url: String,
}

impl CustomerDraft {
    pub fn parse(form: &RawForm) -> Result<Self, ValidationFailure> {
        let mut schema = Schema::new(form);
        let name = schema.text(&NAME);
        let email = schema.text(&EMAIL);
        let image_url = schema.text(&IMAGE_URL);

        let draft = match (name, email, image_url) {
            (Some(name), Some(email), Some(image_url)) => Some(Self {
                name,
                email,
                image_url,
            }),
            _ => None,
        };
        schema.finish(draft)
    }
}

/// Persisted customer row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image_url: String,
}
