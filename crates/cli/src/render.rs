//! Plain-text output.

use std::io::{self, Write};

use marigold_storefront::cart::{CartSummary, CartView};
use marigold_storefront::models::{
    Address, Category, Order, OrderSummary, Page, Product, ProductSummary, Review, User,
    WishlistItem,
};

pub fn product_page(out: &mut impl Write, page: &Page<ProductSummary>) -> io::Result<()> {
    if page.is_empty() {
        return writeln!(out, "No products found.");
    }

    for product in &page.items {
        product_line(out, product)?;
    }
    writeln!(
        out,
        "\nPage {} of {} ({} products)",
        page.page,
        page.total_pages(),
        page.total
    )
}

pub fn product_line(out: &mut impl Write, product: &ProductSummary) -> io::Result<()> {
    let stock = if product.in_stock { "" } else { "  [sold out]" };
    let was = product
        .compare_at_price
        .filter(|compare_at| compare_at.amount > product.price.amount)
        .map(|compare_at| format!(" (was {compare_at})"))
        .unwrap_or_default();
    writeln!(
        out,
        "{:<32} {:>10}{was}{stock}  [{}]",
        product.name, product.price.to_string(), product.slug
    )
}

pub fn product(out: &mut impl Write, product: &Product) -> io::Result<()> {
    writeln!(out, "{} [{}]", product.name, product.slug)?;
    if let Some(brand) = &product.brand {
        writeln!(out, "by {brand}")?;
    }
    if let Some(category) = &product.category {
        writeln!(out, "Category: {}", category.name)?;
    }
    if let Some(rating) = product.rating {
        writeln!(out, "Rating: {rating:.1}/5 ({} reviews)", product.review_count)?;
    }
    if !product.description.is_empty() {
        writeln!(out, "\n{}\n", product.description)?;
    }

    writeln!(out, "Variants:")?;
    for sku in &product.skus {
        let stock = match sku.stock {
            Some(0) => "sold out".to_string(),
            Some(n) => format!("{n} in stock"),
            None => "in stock".to_string(),
        };
        let discount = sku
            .discount_percent()
            .map(|pct| format!(" -{pct}%"))
            .unwrap_or_default();
        writeln!(
            out,
            "  #{:<8} {:<24} {:>10}{discount}  {stock}",
            sku.id,
            sku.label,
            sku.price.to_string()
        )?;
    }
    Ok(())
}

pub fn reviews(out: &mut impl Write, page: &Page<Review>) -> io::Result<()> {
    if page.is_empty() {
        return writeln!(out, "No reviews yet.");
    }
    for review in &page.items {
        writeln!(
            out,
            "{} {} - {} ({})",
            "*".repeat(usize::from(review.rating.min(5))),
            review.title.as_deref().unwrap_or(""),
            review.author,
            review.created_at.format("%Y-%m-%d")
        )?;
        if !review.body.is_empty() {
            writeln!(out, "  {}", review.body)?;
        }
    }
    Ok(())
}

pub fn categories(out: &mut impl Write, categories: &[Category]) -> io::Result<()> {
    for category in categories {
        let indent = if category.parent_id.is_some() { "  " } else { "" };
        let count = category
            .product_count
            .map(|n| format!(" ({n})"))
            .unwrap_or_default();
        writeln!(out, "{indent}{}{count}  [{}]", category.name, category.slug)?;
    }
    Ok(())
}

pub fn cart(out: &mut impl Write, view: &CartView, summary: &CartSummary) -> io::Result<()> {
    if view.is_empty() {
        writeln!(out, "Your cart is empty.")?;
    }

    match view {
        CartView::Guest(cart) => {
            for item in cart.items() {
                writeln!(
                    out,
                    "  #{:<8} {} ({}) x{} @ {}",
                    item.sku_id, item.name, item.sku_label, item.quantity, item.unit_price
                )?;
            }
        }
        CartView::Synced(cart) => {
            for item in &cart.items {
                writeln!(
                    out,
                    "  #{:<8} {} ({}) x{} = {}",
                    item.sku_id, item.name, item.sku_label, item.quantity, item.line_total
                )?;
            }
        }
    }

    summary_lines(out, summary)?;
    if let CartView::Synced(cart) = view {
        if let Some(shipping) = cart.shipping {
            writeln!(out, "Shipping: {shipping}")?;
        }
        if let Some(tax) = cart.tax {
            writeln!(out, "Tax:      {tax}")?;
        }
    }
    writeln!(out, "Total:    {}", summary.total)?;

    if summary.is_estimate {
        writeln!(
            out,
            "(estimate; sign in to see shipping, tax and discounts)"
        )?;
    }
    Ok(())
}

fn summary_lines(out: &mut impl Write, summary: &CartSummary) -> io::Result<()> {
    writeln!(out, "Items:    {}", summary.item_count)?;
    writeln!(out, "Subtotal: {}", summary.subtotal)?;
    match (&summary.coupon, summary.is_estimate) {
        (Some(code), true) => writeln!(out, "Coupon:   {code} (applied at sign in)")?,
        (Some(code), false) => writeln!(out, "Coupon:   {code} (-{})", summary.discount)?,
        (None, _) => {}
    }
    Ok(())
}

pub fn wishlist(out: &mut impl Write, items: &[WishlistItem]) -> io::Result<()> {
    if items.is_empty() {
        return writeln!(out, "Your wishlist is empty.");
    }
    for item in items {
        product_line(out, &item.product)?;
    }
    Ok(())
}

pub fn user(out: &mut impl Write, user: &User) -> io::Result<()> {
    writeln!(out, "{} <{}>", user.display_name(), user.email)?;
    if let Some(phone) = &user.phone {
        writeln!(out, "Phone: {phone}")?;
    }
    writeln!(
        out,
        "Marketing email: {}",
        if user.accepts_marketing { "yes" } else { "no" }
    )
}

pub fn addresses(out: &mut impl Write, addresses: &[Address]) -> io::Result<()> {
    if addresses.is_empty() {
        return writeln!(out, "No saved addresses.");
    }
    for address in addresses {
        address_line(out, address)?;
    }
    Ok(())
}

pub fn address_line(out: &mut impl Write, address: &Address) -> io::Result<()> {
    let default = if address.is_default { " (default)" } else { "" };
    writeln!(
        out,
        "#{:<6} {}: {}{default}",
        address.id,
        address.full_name,
        address.formatted_single_line()
    )
}

pub fn order(out: &mut impl Write, order: &Order) -> io::Result<()> {
    writeln!(
        out,
        "Order {} ({}), placed {}",
        order.number,
        order.status,
        order.placed_at.format("%Y-%m-%d %H:%M")
    )?;
    writeln!(
        out,
        "Payment: {} ({})",
        order.payment_method, order.payment_status
    )?;
    if let Some(address) = &order.shipping_address {
        writeln!(out, "Ship to: {}", address.formatted_single_line())?;
    }
    for item in &order.items {
        writeln!(
            out,
            "  {} ({}) x{} = {}",
            item.name, item.sku_label, item.quantity, item.line_total
        )?;
    }
    writeln!(out, "Subtotal: {}", order.subtotal)?;
    if let Some(discount) = order.discount.filter(|d| !d.is_zero()) {
        let code = order.coupon_code.as_deref().unwrap_or("discount");
        writeln!(out, "Coupon:   {code} (-{discount})")?;
    }
    if let Some(shipping) = order.shipping {
        writeln!(out, "Shipping: {shipping}")?;
    }
    if let Some(tax) = order.tax {
        writeln!(out, "Tax:      {tax}")?;
    }
    writeln!(out, "Total:    {}", order.total)
}

pub fn orders(out: &mut impl Write, page: &Page<OrderSummary>) -> io::Result<()> {
    if page.is_empty() {
        return writeln!(out, "No orders yet.");
    }
    for order in &page.items {
        writeln!(
            out,
            "#{:<6} {:<12} {:<11} {:>10}  {}",
            order.id,
            order.number,
            order.status.to_string(),
            order.total.to_string(),
            order.placed_at.format("%Y-%m-%d")
        )?;
    }
    if page.has_next() {
        writeln!(out, "\nMore: --page {}", page.page + 1)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use marigold_core::{CurrencyCode, Money, ProductId};
    use marigold_storefront::cart::GuestCart;

    use super::*;

    fn rendered(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_empty_guest_cart_is_marked_estimate() {
        let view = CartView::Guest(GuestCart::new(CurrencyCode::USD));
        let summary = view.summary().unwrap();

        let text = rendered(|out| cart(out, &view, &summary));
        assert!(text.contains("Your cart is empty."));
        assert!(text.contains("Total:    $0.00"));
        assert!(text.contains("estimate"));
    }

    #[test]
    fn test_product_line_shows_sale_and_stock() {
        let product = ProductSummary {
            id: ProductId::new(1),
            slug: "linen-shirt".to_string(),
            name: "Linen Shirt".to_string(),
            price: Money::from_minor(3000, CurrencyCode::USD),
            compare_at_price: Some(Money::from_minor(4500, CurrencyCode::USD)),
            image: None,
            in_stock: false,
            rating: None,
        };

        let text = rendered(|out| product_line(out, &product));
        assert!(text.contains("$30.00"));
        assert!(text.contains("(was $45.00)"));
        assert!(text.contains("[sold out]"));
        assert!(text.contains("[linen-shirt]"));
    }

    #[test]
    fn test_empty_product_page() {
        let page: Page<ProductSummary> = Page {
            items: vec![],
            page: 1,
            per_page: 20,
            total: 0,
        };
        assert_eq!(rendered(|out| product_page(out, &page)), "No products found.\n");
    }
}
