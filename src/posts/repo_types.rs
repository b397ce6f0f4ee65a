use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "camelCase")]
#[sqlx(type_name = "service_type", rename_all = "camelCase")]
pub enum ServiceType {
    DailyWalking,
    WeeklyWalking,
    DailySitting,
    WeeklySitting,
    /// Ad-hoc arrangement; never carries dates.
    Other,
}

impl ServiceType {
    pub fn allows_dates(&self) -> bool {
        !matches!(self, ServiceType::Other)
    }

    pub fn parse(value: &str) -> Option<ServiceType> {
        match value {
            "dailyWalking" => Some(ServiceType::DailyWalking),
            "weeklyWalking" => Some(ServiceType::WeeklyWalking),
            "dailySitting" => Some(ServiceType::DailySitting),
            "weeklySitting" => Some(ServiceType::WeeklySitting),
            "other" => Some(ServiceType::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "animal_type", rename_all = "lowercase")]
pub enum AnimalType {
    Cat,
    Dog,
    Both,
}

impl AnimalType {
    pub fn parse(value: &str) -> Option<AnimalType> {
        match value {
            "cat" => Some(AnimalType::Cat),
            "dog" => Some(AnimalType::Dog),
            "both" => Some(AnimalType::Both),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "animal_size", rename_all = "lowercase")]
pub enum AnimalSize {
    Mini,
    Small,
    Medium,
    Large,
    Other,
}

impl AnimalSize {
    pub fn parse(value: &str) -> Option<AnimalSize> {
        match value {
            "mini" => Some(AnimalSize::Mini),
            "small" => Some(AnimalSize::Small),
            "medium" => Some(AnimalSize::Medium),
            "large" => Some(AnimalSize::Large),
            "other" => Some(AnimalSize::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for AnimalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AnimalType::Cat => "cat",
            AnimalType::Dog => "dog",
            AnimalType::Both => "both",
        })
    }
}

impl std::fmt::Display for AnimalSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AnimalSize::Mini => "mini",
            AnimalSize::Small => "small",
            AnimalSize::Medium => "medium",
            AnimalSize::Large => "large",
            AnimalSize::Other => "other",
        })
    }
}

/// A seeded city a post can be placed in.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Location {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub description: String,
    pub animal_type: AnimalType,
    pub animal_size: AnimalSize,
    pub location_id: Option<i32>,
    pub images_url: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A bookable offering attached to a post. `owner_id` is the post author.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ServiceListing {
    pub id: Uuid,
    pub post_id: Uuid,
    pub owner_id: Uuid,
    pub service_type: ServiceType,
    pub price: Decimal,
    pub unavailable_dates: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: Uuid,
    pub description: String,
    pub animal_type: AnimalType,
    pub animal_size: AnimalSize,
    pub location_id: Option<i32>,
}

/// Columns left as `None` keep their stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostPatch {
    pub description: Option<String>,
    pub animal_type: Option<AnimalType>,
    pub animal_size: Option<AnimalSize>,
    pub location_id: Option<i32>,
}

/// Edits one existing listing of the post in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ServicePatch {
    pub id: Uuid,
    pub service_type: Option<ServiceType>,
    pub price: Option<Decimal>,
}

pub enum PostWrite {
    Written(Post),
    Missing,
    UnknownService(Uuid),
}

/// Every supplied filter must hold. Empty lists and `None` do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostSearch {
    pub keywords: Option<String>,
    pub service_types: Vec<ServiceType>,
    pub animal_type: Option<AnimalType>,
    pub animal_sizes: Vec<AnimalSize>,
    pub location_id: Option<i32>,
}

impl PostSearch {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_none()
            && self.service_types.is_empty()
            && self.animal_type.is_none()
            && self.animal_sizes.is_empty()
            && self.location_id.is_none()
    }
}


impl sqlx::postgres::PgHasArrayType for ServiceType {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("_service_type")
    }
}

impl sqlx::postgres::PgHasArrayType for AnimalSize {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("_animal_size")
    }
}
