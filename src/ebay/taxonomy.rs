#![allow(non_snake_case)]

use super::{EbayClient, rejection_message};
use crate::models::Category;
use serde::Deserialize;
use thiserror::Error;
use urlencoding::encode;

#[derive(Debug, Error)]
pub enum EbayTaxonomyError {
    #[error("taxonomy request failed: {0}")]
    Request(String),
}

/// The condition vocabulary the seller UI offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionLabel {
    New,
    UsedLikeNew,
    UsedGood,
    UsedAcceptable,
    ForParts,
    Unrecognized,
}

impl ConditionLabel {
    pub const SUPPORTED: [(&'static str, ConditionLabel); 5] = [
        ("New", ConditionLabel::New),
        ("Used - Like New", ConditionLabel::UsedLikeNew),
        ("Used - Good", ConditionLabel::UsedGood),
        ("Used - Acceptable", ConditionLabel::UsedAcceptable),
        ("For parts or not working", ConditionLabel::ForParts),
    ];

    /// Exact match on the supported labels, ignoring case and runs of whitespace.
    pub fn parse(raw: &str) -> Self {
        let wanted = normalize(raw);
        Self::SUPPORTED
            .iter()
            .find(|(label, _)| normalize(label) == wanted)
            .map(|(_, parsed)| *parsed)
            .unwrap_or(ConditionLabel::Unrecognized)
    }
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EbayCondition {
    New,
    LikeNew,
    NewOther,
    NewWithDefects,
    UsedExcellent,
    UsedVeryGood,
    UsedGood,
    UsedAcceptable,
    ForPartsOrNotWorking,
}

/// Where an unrecognized label lands. Chosen as the middle of the used range.
pub const DEFAULT_CONDITION: EbayCondition = EbayCondition::UsedGood;

impl EbayCondition {
    pub const ALL: [EbayCondition; 9] = [
        EbayCondition::New,
        EbayCondition::LikeNew,
        EbayCondition::NewOther,
        EbayCondition::NewWithDefects,
        EbayCondition::UsedExcellent,
        EbayCondition::UsedVeryGood,
        EbayCondition::UsedGood,
        EbayCondition::UsedAcceptable,
        EbayCondition::ForPartsOrNotWorking,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            EbayCondition::New => "NEW",
            EbayCondition::LikeNew => "LIKE_NEW",
            EbayCondition::NewOther => "NEW_OTHER",
            EbayCondition::NewWithDefects => "NEW_WITH_DEFECTS",
            EbayCondition::UsedExcellent => "USED_EXCELLENT",
            EbayCondition::UsedVeryGood => "USED_VERY_GOOD",
            EbayCondition::UsedGood => "USED_GOOD",
            EbayCondition::UsedAcceptable => "USED_ACCEPTABLE",
            EbayCondition::ForPartsOrNotWorking => "FOR_PARTS_OR_NOT_WORKING",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl From<ConditionLabel> for EbayCondition {
    fn from(label: ConditionLabel) -> Self {
        match label {
            ConditionLabel::New => EbayCondition::New,
            ConditionLabel::UsedLikeNew => EbayCondition::LikeNew,
            ConditionLabel::UsedGood => EbayCondition::UsedGood,
            ConditionLabel::UsedAcceptable => EbayCondition::UsedAcceptable,
            ConditionLabel::ForParts => EbayCondition::ForPartsOrNotWorking,
            ConditionLabel::Unrecognized => DEFAULT_CONDITION,
        }
    }
}

pub fn map_condition(label: &str) -> EbayCondition {
    ConditionLabel::parse(label).into()
}

#[derive(Debug, Deserialize)]
struct SuggestionPage {
    #[serde(default)]
    categorySuggestions: Vec<Suggestion>,
}

#[derive(Debug, Deserialize)]
struct Suggestion {
    category: SuggestedCategory,
}

#[derive(Debug, Deserialize)]
struct SuggestedCategory {
    categoryId: String,
    categoryName: String,
}

impl EbayClient {
    /// Best leaf category for free text, if the taxonomy has an opinion.
    pub async fn suggest_category(
        &self,
        query: &str,
        access_token: &str,
    ) -> Result<Option<Category>, EbayTaxonomyError> {
        let url = self.url(&format!(
            "/commerce/taxonomy/v1/category_tree/{}/get_category_suggestions",
            encode(&self.config().category_tree_id)
        ));
        let response = self
            .http
            .get(url)
            .query(&[("q", query)])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| EbayTaxonomyError::Request(err.to_string()))?;

        // 204 means "no suggestions" on this endpoint
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(EbayTaxonomyError::Request(rejection_message(response).await));
        }

        let page: SuggestionPage = response
            .json()
            .await
            .map_err(|err| EbayTaxonomyError::Request(err.to_string()))?;
        Ok(page.categorySuggestions.into_iter().next().map(|s| Category {
            id: Some(s.category.categoryId),
            name: s.category.categoryName,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_label_has_a_fixed_enum() {
        let mapped: Vec<&str> = ConditionLabel::SUPPORTED
            .iter()
            .map(|(label, _)| map_condition(label).code())
            .collect();
        assert_eq!(
            mapped,
            vec![
                "NEW",
                "LIKE_NEW",
                "USED_GOOD",
                "USED_ACCEPTABLE",
                "FOR_PARTS_OR_NOT_WORKING"
            ]
        );
    }

    #[test]
    fn unrecognized_label_maps_to_default() {
        assert_eq!(ConditionLabel::parse("Gently loved"), ConditionLabel::Unrecognized);
        assert_eq!(map_condition("Gently loved"), DEFAULT_CONDITION);
        assert_eq!(map_condition(""), EbayCondition::UsedGood);
    }

    #[test]
    fn parse_tolerates_case_and_spacing_only() {
        assert_eq!(ConditionLabel::parse("used  -  good"), ConditionLabel::UsedGood);
        assert_eq!(ConditionLabel::parse("Used-Good"), ConditionLabel::Unrecognized);
        assert_eq!(ConditionLabel::parse(" USED - GOOD "), ConditionLabel::UsedGood);
        assert_eq!(ConditionLabel::parse("Used   - Like New"), ConditionLabel::UsedLikeNew);
    }

    #[test]
    fn codes_round_trip() {
        for condition in EbayCondition::ALL {
            assert_eq!(EbayCondition::from_code(condition.code()), Some(condition));
        }
        assert_eq!(EbayCondition::from_code("USED"), None);
    }
}
