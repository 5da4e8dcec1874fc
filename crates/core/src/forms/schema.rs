use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Textarea,
    Number,
    Select,
    Radio,
    Checkbox,
    File,
    Date,
    Time,
    Url,
    Wordcount,
    Category,
    Multiselect,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Number => "number",
            Self::Select => "select",
            Self::Radio => "radio",
            Self::Checkbox => "checkbox",
            Self::File => "file",
            Self::Date => "date",
            Self::Time => "time",
            Self::Url => "url",
            Self::Wordcount => "wordcount",
            Self::Category => "category",
            Self::Multiselect => "multiselect",
        }
    }

    /// Field types whose answer must be one of the declared options.
    pub fn is_single_choice(&self) -> bool {
        matches!(self, Self::Select | Self::Radio | Self::Category)
    }

    pub fn is_multi_choice(&self) -> bool {
        matches!(self, Self::Multiselect | Self::Checkbox)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Number | Self::Wordcount)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub value: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Multiplier applied to the base price when this option is selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_modifier: Option<Decimal>,
}

impl FieldOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self { value: value.into(), label: label.into(), description: None, price_modifier: None }
    }

    pub fn with_price_modifier(mut self, modifier: Decimal) -> Self {
        self.price_modifier = Some(modifier);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValidation {
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_message: Option<String>,
    /// Accepted file extensions without the leading dot, e.g. `pdf`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_types: Vec<String>,
    /// Upper bound in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,
}

/// The owning field is only evaluated when `field_id` currently holds `equals`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConditional {
    pub field_id: String,
    pub equals: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormFieldSchema {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<FieldValidation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional: Option<FieldConditional>,
}

impl FormFieldSchema {
    pub fn new(id: impl Into<String>, field_type: FieldType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            field_type,
            label: label.into(),
            placeholder: None,
            description: None,
            options: Vec::new(),
            validation: None,
            conditional: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.validation.get_or_insert_with(FieldValidation::default).required = true;
        self
    }

    pub fn with_options(mut self, options: Vec<FieldOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_validation(mut self, validation: FieldValidation) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn shown_when(mut self, field_id: impl Into<String>, equals: impl Into<String>) -> Self {
        self.conditional =
            Some(FieldConditional { field_id: field_id.into(), equals: equals.into() });
        self
    }

    pub fn is_required(&self) -> bool {
        self.validation.as_ref().map(|validation| validation.required).unwrap_or(false)
    }

    pub fn option(&self, value: &str) -> Option<&FieldOption> {
        self.options.iter().find(|option| option.value == value)
    }
}
