//! Invoice rendering.
//!
//! Renders a plain-text invoice from the order's persisted pricing
//! breakdown. The renderer never recomputes subtotal, discount, tax or
//! total; the order record is the single source of truth, so an invoice
//! can never drift from what the customer was charged.

use crate::domain::aggregates::order::Order;

const SELLER: [&str; 3] = [
    "Market Cloud Storefront",
    "123 Business Street",
    "Business City, State 12345",
];

/// Renders `order` as an invoice document.
pub fn render_invoice(order: &Order) -> Vec<u8> {
    let mut doc = String::new();
    let line = "=".repeat(72);
    let thin = "-".repeat(72);

    doc.push_str(&line);
    doc.push('\n');
    let invoice_number = order
        .order_number
        .strip_prefix("ORD-")
        .map(|n| format!("INV-{n}"))
        .unwrap_or_else(|| format!("INV-{}", order.order_number));
    doc.push_str(&format!(
        "INVOICE {invoice_number:>tab$}\n",
        tab = 72 - "INVOICE ".len()
    ));
    doc.push_str(&format!("Date: {}\n", order.created_at.format("%d %b %Y")));
    doc.push_str(&format!("Order: {}\n", order.order_number));
    doc.push_str(&line);
    doc.push('\n');

    doc.push_str("FROM:\n");
    for row in SELLER {
        doc.push_str(&format!("  {row}\n"));
    }
    doc.push_str("\nBILL TO:\n");
    doc.push_str(&format!("  {}\n", order.shipping.name));
    doc.push_str(&format!("  {}\n", order.shipping.address));
    doc.push_str(&format!(
        "  {}, {} {}\n",
        order.shipping.city, order.shipping.state, order.shipping.zip_code
    ));
    doc.push_str(&format!("  {}\n\n", order.shipping.phone));

    doc.push_str(&format!(
        "{:<36} {:>5} {:>13} {:>14}\n",
        "ITEM", "QTY", "UNIT PRICE", "TOTAL"
    ));
    doc.push_str(&thin);
    doc.push('\n');
    for item in &order.items {
        let name = if item.name.chars().count() > 36 {
            let truncated: String = item.name.chars().take(33).collect();
            format!("{truncated}...")
        } else {
            item.name.clone()
        };
        doc.push_str(&format!(
            "{:<36} {:>5} {:>13} {:>14}\n",
            name,
            item.quantity,
            item.unit_price.to_string(),
            item.line_total.to_string(),
        ));
    }
    doc.push_str(&thin);
    doc.push('\n');

    doc.push_str(&format!("{:>57} {:>14}\n", "Subtotal:", order.subtotal.to_string()));
    if !order.discount.is_zero() {
        let label = match &order.coupon {
            Some(snapshot) => format!("Discount ({}):", snapshot.code),
            None => "Discount:".to_string(),
        };
        doc.push_str(&format!("{label:>57} {:>14}\n", format!("-{}", order.discount)));
    }
    doc.push_str(&format!("{:>57} {:>14}\n", "Tax (5%):", order.tax.to_string()));
    doc.push_str(&format!("{:>57} {:>14}\n", "TOTAL:", order.total.to_string()));

    if let Some(payment) = &order.payment {
        doc.push('\n');
        doc.push_str(&format!(
            "Payment: {} via {} ({:?}) on {}\n",
            payment.payment_id,
            payment.payment_method,
            payment.payment_status,
            payment.timestamp.format("%d %b %Y"),
        ));
    }

    doc.push('\n');
    doc.push_str("Thank you for your order!\n");
    doc.into_bytes()
}
