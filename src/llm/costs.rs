//! Per-token prices for the models we talk to.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const PER_MILLION: Decimal = dec!(1000000);

/// (input, output) USD price per token for a chat model. Unknown models are free.
pub fn chat_cost_per_token(model: &str) -> (Decimal, Decimal) {
    let (input, output) = match model_family(model) {
        "gpt-4o-mini" => (dec!(0.15), dec!(0.60)),
        "gpt-4o" => (dec!(2.50), dec!(10.00)),
        "gpt-4.1-mini" => (dec!(0.40), dec!(1.60)),
        "gpt-4.1" => (dec!(2.00), dec!(8.00)),
        "gpt-3.5-turbo" => (dec!(0.50), dec!(1.50)),
        _ => (Decimal::ZERO, Decimal::ZERO),
    };
    (input / PER_MILLION, output / PER_MILLION)
}

/// USD price per input token for an embedding model.
pub fn embedding_cost_per_token(model: &str) -> Decimal {
    let price = match model {
        "text-embedding-3-small" => dec!(0.02),
        "text-embedding-3-large" => dec!(0.13),
        "text-embedding-ada-002" => dec!(0.10),
        _ => Decimal::ZERO,
    };
    price / PER_MILLION
}

/// Strip dated snapshot suffixes ("gpt-4o-2024-08-06" → "gpt-4o").
fn model_family(model: &str) -> &str {
    const FAMILIES: [&str; 5] = [
        "gpt-4o-mini",
        "gpt-4o",
        "gpt-4.1-mini",
        "gpt-4.1",
        "gpt-3.5-turbo",
    ];
    FAMILIES
        .iter()
        .find(|family| {
            model == **family
                || model
                    .strip_prefix(**family)
                    .is_some_and(|rest| rest.starts_with("-20"))
        })
        .copied()
        .unwrap_or(model)
}
