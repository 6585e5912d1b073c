use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{deserialize_id, Entity};
use crate::api::{ApiClient, Auth, ClientError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    #[default]
    #[serde(alias = "percent")]
    Percentage,
    Fixed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    #[serde(
        default,
        alias = "_id",
        deserialize_with = "deserialize_id",
        skip_serializing_if = "String::is_empty"
    )]
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub discount_type: DiscountType,
    #[serde(default)]
    pub discount_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Coupon {
    /// Price after discount, never below zero, rounded to cents.
    pub fn apply(&self, amount: f64) -> f64 {
        let discounted = match self.discount_type {
            DiscountType::Percentage => {
                amount * (1.0 - self.discount_value.clamp(0.0, 100.0) / 100.0)
            }
            DiscountType::Fixed => amount - self.discount_value.max(0.0),
        };
        (discounted.max(0.0) * 100.0).round() / 100.0
    }
}

impl Entity for Coupon {
    const COLLECTION: &'static str = "/coupons/";
    const SLUG: &'static str = "coupons";
    const LABEL: &'static str = "Coupon";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponCheck {
    pub code: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon: Option<Coupon>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CouponValidation {
    pub fn is_valid(&self) -> bool {
        self.valid == Some(true)
    }
}

pub struct Coupons {
    client: ApiClient,
}

impl Coupons {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Ask the backend whether `code` applies to `amount`. The backend's
    /// verdict is final; when it only returns the coupon, validity comes from
    /// `isActive` and the final amount is derived locally.
    pub async fn validate(
        &self,
        check: &CouponCheck,
        auth: Auth<'_>,
    ) -> Result<CouponValidation, ClientError> {
        let validation: CouponValidation =
            self.client.post("/coupons/validate", check, auth).await?;
        Ok(settle(validation, check.amount))
    }
}

fn settle(mut validation: CouponValidation, amount: f64) -> CouponValidation {
    let valid = match (validation.valid, validation.coupon.as_ref()) {
        (Some(valid), _) => valid,
        (None, Some(coupon)) => coupon.is_active != Some(false),
        (None, None) => validation.final_amount.is_some(),
    };
    validation.valid = Some(valid);

    if !valid {
        validation.final_amount = None;
        return validation;
    }
    if validation.final_amount.is_none() {
        validation.final_amount = validation.coupon.as_ref().map(|coupon| coupon.apply(amount));
    }
    validation
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use serde_json::json;

    use super::{settle, Coupon, CouponCheck, CouponValidation, Coupons, DiscountType};
    use crate::api::{ApiClient, Auth};

    #[test]
    fn discounts_clamp_at_zero() {
        let percent = Coupon {
            code: "REEF10".into(),
            discount_type: DiscountType::Percentage,
            discount_value: 10.0,
            ..Coupon::default()
        };
        assert!((percent.apply(199.99) - 179.99).abs() < f64::EPSILON);

        let fixed = Coupon {
            code: "BIG".into(),
            discount_type: DiscountType::Fixed,
            discount_value: 500.0,
            ..Coupon::default()
        };
        assert_eq!(fixed.apply(120.0), 0.0);
    }

    #[tokio::test]
    async fn validate_derives_final_amount_from_coupon() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/coupons/validate")
            .match_body(mockito::Matcher::Json(json!({"code": "REEF10", "amount": 300.0})))
            .with_status(200)
            .with_body(
                r#"{"coupon": {"_id": "k1", "code": "REEF10", "discountType": "percent", "discountValue": 10}}"#,
            )
            .create_async()
            .await;

        let coupons = Coupons::new(ApiClient::new(&server.url(), Duration::from_secs(5))?);
        let validation = coupons
            .validate(
                &CouponCheck {
                    code: "REEF10".into(),
                    amount: 300.0,
                },
                Auth::Anonymous,
            )
            .await?;

        assert!(validation.is_valid());
        assert_eq!(validation.final_amount, Some(270.0));
        Ok(())
    }

    #[tokio::test]
    async fn backend_rejection_is_not_overridden() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/coupons/validate")
            .with_status(200)
            .with_body(
                r#"{"valid": false, "message": "Coupon expired",
                    "coupon": {"_id": "k2", "code": "OLD50", "discountType": "fixed", "discountValue": 50}}"#,
            )
            .create_async()
            .await;

        let coupons = Coupons::new(ApiClient::new(&server.url(), Duration::from_secs(5))?);
        let validation = coupons
            .validate(
                &CouponCheck {
                    code: "OLD50".into(),
                    amount: 100.0,
                },
                Auth::Anonymous,
            )
            .await?;

        assert!(!validation.is_valid());
        assert_eq!(validation.final_amount, None);
        assert_eq!(validation.message.as_deref(), Some("Coupon expired"));
        Ok(())
    }

    #[test]
    fn inactive_coupon_without_verdict_is_invalid() {
        let validation = settle(
            CouponValidation {
                coupon: Some(Coupon {
                    code: "PAUSED".into(),
                    discount_type: DiscountType::Fixed,
                    discount_value: 20.0,
                    is_active: Some(false),
                    ..Coupon::default()
                }),
                ..CouponValidation::default()
            },
            80.0,
        );
        assert_eq!(validation.valid, Some(false));
        assert_eq!(validation.final_amount, None);
    }
}
