//! Order history lookup.

use std::fmt::Write as _;

use artisan_market_storefront::models::Order;
use artisan_market_storefront::{AppError, Storefront};
use secrecy::SecretString;
use tracing::info;

use crate::CliError;

fn format_order(order: &Order) -> String {
    let placed = order.created_at.map_or_else(
        || "-".to_string(),
        |at| at.format("%Y-%m-%d %H:%M").to_string(),
    );
    let mut out = format!(
        "{}  {}  {:<10}  {:<14}  {}",
        order.id, placed, order.status, order.payment_method, order.total
    );
    for line in &order.items {
        let _ = write!(
            out,
            "\n    {} x {}  {}",
            line.quantity,
            line.name,
            line.line_total()
        );
    }
    out
}

/// Sign in as the account and list its orders.
///
/// # Errors
///
/// Returns an error if sign-in fails or the orders cannot be read.
#[allow(clippy::print_stdout)]
pub async fn list(storefront: &Storefront, email: &str, password: SecretString) -> Result<(), CliError> {
    let user = storefront.sign_in(email, &password).await?;
    let orders = storefront
        .checkout()
        .orders_for(&user.uid)
        .await
        .map_err(AppError::from)?;

    for order in &orders {
        println!("{}", format_order(order));
    }
    info!(count = orders.len(), uid = %user.uid, "Listed orders");

    storefront.sign_out().await;
    Ok(())
}
