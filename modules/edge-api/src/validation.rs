//! Request validation for the order intake endpoint.

use crate::models::{CreateOrderRequest, OrderItemRequest};

pub const MAX_ITEMS: usize = 50;
pub const MAX_QUANTITY: i32 = 100;
pub const MAX_EMAIL_LENGTH: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("items must contain between 1 and {MAX_ITEMS} entries")]
    ItemCount,

    #[error("quantity must be between 1 and {MAX_QUANTITY}")]
    Quantity,

    #[error("unit_price_cents must be non-negative")]
    UnitPrice,

    #[error("email is not valid")]
    Email,

    #[error("payment.method must be \"card\"")]
    PaymentMethod,

    #[error("payment.token must not be empty")]
    PaymentToken,

    #[error("currency must be a 3-letter ISO code")]
    Currency,

    #[error("order total overflows")]
    TotalOverflow,
}

/// Minimal RFC-style shape check: one `@`, non-empty local and domain
/// parts, bounded length. Anything stricter belongs to the mail provider.
fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.starts_with('.')
        }
        None => false,
    }
}

pub fn validate_create_order(request: &CreateOrderRequest) -> Result<(), ValidationError> {
    if request.items.is_empty() || request.items.len() > MAX_ITEMS {
        return Err(ValidationError::ItemCount);
    }
    for item in &request.items {
        if item.quantity < 1 || item.quantity > MAX_QUANTITY {
            return Err(ValidationError::Quantity);
        }
        if item.unit_price_cents < 0 {
            return Err(ValidationError::UnitPrice);
        }
    }
    if !is_valid_email(&request.email) {
        return Err(ValidationError::Email);
    }
    if request.payment.method != "card" {
        return Err(ValidationError::PaymentMethod);
    }
    if request.payment.token.trim().is_empty() {
        return Err(ValidationError::PaymentToken);
    }
    if request.currency.len() != 3 || !request.currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::Currency);
    }

    Ok(())
}

/// Order total in integer cents, exactly `Σ quantity × unit_price_cents`.
pub fn compute_total(items: &[OrderItemRequest]) -> Result<i64, ValidationError> {
    let mut total: i64 = 0;
    for item in items {
        let line = i64::from(item.quantity)
            .checked_mul(item.unit_price_cents)
            .ok_or(ValidationError::TotalOverflow)?;
        total = total.checked_add(line).ok_or(ValidationError::TotalOverflow)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentDetails;
    use uuid::Uuid;

    fn item(quantity: i32, unit_price_cents: i64) -> OrderItemRequest {
        OrderItemRequest {
            product_id: Uuid::new_v4(),
            quantity,
            unit_price_cents,
        }
    }

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            user_id: Uuid::new_v4(),
            email: "c@x.com".to_string(),
            items: vec![item(2, 1000)],
            payment: PaymentDetails {
                method: "card".to_string(),
                token: "tok_ok".to_string(),
            },
            currency: "USD".to_string(),
        }
    }

    #[test]
    fn test_accepts_valid_request() {
        assert!(validate_create_order(&request()).is_ok());
    }

    #[test]
    fn test_item_count_bounds() {
        let mut empty = request();
        empty.items.clear();
        assert!(matches!(
            validate_create_order(&empty),
            Err(ValidationError::ItemCount)
        ));

        let mut too_many = request();
        too_many.items = (0..51).map(|_| item(1, 100)).collect();
        assert!(matches!(
            validate_create_order(&too_many),
            Err(ValidationError::ItemCount)
        ));

        let mut at_limit = request();
        at_limit.items = (0..50).map(|_| item(1, 100)).collect();
        assert!(validate_create_order(&at_limit).is_ok());
    }

    #[test]
    fn test_quantity_bounds() {
        let mut zero = request();
        zero.items = vec![item(0, 100)];
        assert!(matches!(
            validate_create_order(&zero),
            Err(ValidationError::Quantity)
        ));

        let mut over = request();
        over.items = vec![item(101, 100)];
        assert!(matches!(
            validate_create_order(&over),
            Err(ValidationError::Quantity)
        ));

        let mut at_limit = request();
        at_limit.items = vec![item(100, 100)];
        assert!(validate_create_order(&at_limit).is_ok());
    }

    #[test]
    fn test_rejects_negative_price() {
        let mut negative = request();
        negative.items = vec![item(1, -1)];
        assert!(matches!(
            validate_create_order(&negative),
            Err(ValidationError::UnitPrice)
        ));
    }

    #[test]
    fn test_email_shape() {
        for bad in ["", "no-at-sign", "@x.com", "a@", &"a".repeat(300)] {
            let mut r = request();
            r.email = bad.to_string();
            assert!(
                matches!(validate_create_order(&r), Err(ValidationError::Email)),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_payment_fields() {
        let mut wrong_method = request();
        wrong_method.payment.method = "paypal".to_string();
        assert!(matches!(
            validate_create_order(&wrong_method),
            Err(ValidationError::PaymentMethod)
        ));

        let mut empty_token = request();
        empty_token.payment.token = "  ".to_string();
        assert!(matches!(
            validate_create_order(&empty_token),
            Err(ValidationError::PaymentToken)
        ));
    }

    #[test]
    fn test_total_is_sum_of_lines() {
        let items = vec![item(2, 1000), item(3, 250)];
        assert_eq!(compute_total(&items).unwrap(), 2750);
    }

    #[test]
    fn test_total_overflow_is_an_error() {
        let items = vec![item(100, i64::MAX / 10)];
        assert!(matches!(
            compute_total(&items),
            Err(ValidationError::TotalOverflow)
        ));
    }
}
