use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub sku: String,
    pub quantity: u32,
    pub unit_price: BigDecimal,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Prices a cart: sum of unit price times quantity.
#[derive(Debug, Default, Clone, Copy)]
pub struct PaymentAmountCalculator;

impl PaymentAmountCalculator {
    pub fn total(&self, items: &[CartItem]) -> BigDecimal {
        items.iter().fold(BigDecimal::zero(), |acc, item| {
            acc + &item.unit_price * BigDecimal::from(item.quantity)
        })
    }
}
