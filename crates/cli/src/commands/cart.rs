//! Cart and wishlist commands.

use std::io::Write;

use clap::Subcommand;
use marigold_core::{Quantity, SkuId};
use marigold_storefront::{AppError, Storefront};

use crate::{CliResult, render};

#[derive(Subcommand)]
pub enum CartAction {
    /// Show the cart
    Show,
    /// Add a product
    Add {
        /// Product slug
        slug: String,
        /// Variant ID (defaults to the first one in stock)
        #[arg(long)]
        sku: Option<SkuId>,
        /// Quantity
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Change the quantity of a variant (0 removes it)
    Update {
        /// Variant ID
        sku: SkuId,
        /// New quantity
        quantity: u32,
    },
    /// Remove a variant
    Remove {
        /// Variant ID
        sku: SkuId,
    },
    /// Remove everything
    Clear,
    /// Apply a coupon code
    Coupon {
        /// Coupon code
        code: String,
    },
    /// Remove the coupon
    Uncoupon,
}

#[derive(Subcommand)]
pub enum WishlistAction {
    /// List saved products
    List,
    /// Save a product
    Add {
        /// Product slug
        slug: String,
    },
    /// Remove a saved product
    Remove {
        /// Product slug
        slug: String,
    },
    /// Move a saved product to the cart
    Move {
        /// Product slug
        slug: String,
    },
}

pub async fn cart(storefront: &Storefront, action: CartAction, out: &mut impl Write) -> CliResult {
    storefront.restore().await?;
    let session = storefront.cart();

    match action {
        CartAction::Show => {}
        CartAction::Add {
            slug,
            sku,
            quantity,
        } => {
            let product = storefront.products().get(&slug).await?;
            let sku = match sku {
                Some(id) => product
                    .sku(id)
                    .ok_or_else(|| AppError::NotFound(format!("variant {id} of {}", product.name)))?,
                None => product.default_sku().ok_or_else(|| {
                    AppError::InvalidInput(format!("{} is out of stock", product.name))
                })?,
            };
            let quantity = Quantity::new(quantity).map_err(AppError::from)?;
            session.add_item(&product, sku, quantity).await?;
            writeln!(out, "Added {} ({}) x{quantity}.\n", product.name, sku.label)?;
        }
        CartAction::Update { sku, quantity } => {
            session.update_quantity(sku, quantity).await?;
        }
        CartAction::Remove { sku } => {
            session.remove_item(sku).await?;
        }
        CartAction::Clear => {
            session.clear().await?;
        }
        CartAction::Coupon { code } => {
            session.apply_coupon(&code).await?;
        }
        CartAction::Uncoupon => {
            session.remove_coupon().await?;
        }
    }

    let view = session.view().await;
    let summary = view.summary()?;
    render::cart(out, &view, &summary)?;
    Ok(())
}

pub async fn wishlist(storefront: &Storefront, action: WishlistAction, out: &mut impl Write) -> CliResult {
    let wishlist = storefront.wishlist();

    match action {
        WishlistAction::List => {
            let items = wishlist.list().await?;
            render::wishlist(out, &items)?;
        }
        WishlistAction::Add { slug } => {
            let product = storefront.products().get(&slug).await?;
            wishlist.add(product.id).await?;
            writeln!(out, "Saved {}.", product.name)?;
        }
        WishlistAction::Remove { slug } => {
            let product = storefront.products().get(&slug).await?;
            wishlist.remove(product.id).await?;
            writeln!(out, "Removed {}.", product.name)?;
        }
        WishlistAction::Move { slug } => {
            storefront.restore().await?;
            let summary = storefront.move_wishlist_item_to_cart(&slug).await?;
            writeln!(
                out,
                "Moved to cart. Cart now has {} items ({}).",
                summary.item_count, summary.total
            )?;
        }
    }
    Ok(())
}
