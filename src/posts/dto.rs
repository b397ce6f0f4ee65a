use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{
    AnimalSize, AnimalType, Post, PostPatch, PostSearch, ServiceListing, ServicePatch, ServiceType,
};
use crate::bookings::availability::{check_service_type, normalize_dates};

/// Exclusive bound of a `NUMERIC(10, 2)` column.
const PRICE_LIMIT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceRequest {
    pub service_type: ServiceType,
    pub price: Decimal,
    #[serde(default)]
    pub unavailable_dates: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub description: String,
    pub animal_type: AnimalType,
    pub animal_size: AnimalSize,
    #[serde(default)]
    pub location_id: Option<i32>,
    pub services: Vec<CreateServiceRequest>,
}

/// Listing input after validation; dates normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct NewService {
    pub service_type: ServiceType,
    pub price: Decimal,
    pub unavailable_dates: Vec<String>,
}

pub fn validate_price(price: Decimal) -> Result<Decimal, String> {
    if price.is_sign_negative() {
        return Err("Price cannot be negative".into());
    }
    let price = price.normalize();
    if price.scale() > 2 {
        return Err("Price must have at most 2 decimal places".into());
    }
    if price >= PRICE_LIMIT {
        return Err("Price is too large".into());
    }
    Ok(price)
}

impl CreatePostRequest {
    pub fn validate(&self) -> Result<Vec<NewService>, String> {
        if self.description.trim().is_empty() {
            return Err("Description is required".into());
        }
        if self.services.is_empty() {
            return Err("At least one service is required".into());
        }
        self.services
            .iter()
            .map(|s| {
                let price = validate_price(s.price)?;
                let dates = normalize_dates(&s.unavailable_dates)?;
                check_service_type(s.service_type, &dates)?;
                Ok(NewService {
                    service_type: s.service_type,
                    price,
                    unavailable_dates: dates,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateServiceRequest {
    pub id: Uuid,
    pub service_type: Option<ServiceType>,
    pub price: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub description: Option<String>,
    pub animal_type: Option<AnimalType>,
    pub animal_size: Option<AnimalSize>,
    pub location_id: Option<i32>,
    #[serde(default)]
    pub services: Vec<UpdateServiceRequest>,
}

impl UpdatePostRequest {
    pub fn validate(&self) -> Result<(PostPatch, Vec<ServicePatch>), String> {
        let description = match self.description.as_deref().map(str::trim) {
            Some("") => return Err("Description cannot be empty".into()),
            other => other.map(str::to_string),
        };
        let patch = PostPatch {
            description,
            animal_type: self.animal_type,
            animal_size: self.animal_size,
            location_id: self.location_id,
        };
        let services = self
            .services
            .iter()
            .map(|s| {
                Ok(ServicePatch {
                    id: s.id,
                    service_type: s.service_type,
                    price: s.price.map(validate_price).transpose()?,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        if patch == PostPatch::default() && services.is_empty() {
            return Err("Nothing to update".into());
        }
        Ok((patch, services))
    }
}

/// List filters are comma separated, e.g. `serviceTypes=dailyWalking,other`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub keywords: Option<String>,
    pub service_types: Option<String>,
    pub animal_type: Option<String>,
    pub animal_sizes: Option<String>,
    pub location_id: Option<i32>,
}

fn split_list<T>(
    raw: Option<&str>,
    parse: fn(&str) -> Option<T>,
    what: &str,
) -> Result<Vec<T>, String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| parse(v).ok_or_else(|| format!("Unknown {what}: {v}")))
        .collect()
}

impl SearchQuery {
    pub fn into_search(self) -> Result<PostSearch, String> {
        let animal_type = match self.animal_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(v) => Some(
                AnimalType::parse(v).ok_or_else(|| format!("Unknown animal type: {v}"))?,
            ),
        };
        let service_types =
            split_list(self.service_types.as_deref(), ServiceType::parse, "service type")?;
        let animal_sizes =
            split_list(self.animal_sizes.as_deref(), AnimalSize::parse, "animal size")?;
        let search = PostSearch {
            keywords: self
                .keywords
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            service_types,
            animal_type,
            animal_sizes,
            location_id: self.location_id,
        };
        if search.is_empty() {
            return Err("At least one search filter must be provided.".into());
        }
        Ok(search)
    }
}

#[derive(Debug, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub services: Vec<ServiceListing>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}
