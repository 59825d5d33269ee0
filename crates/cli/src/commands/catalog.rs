//! Catalog commands.

use std::io::Write;

use clap::Subcommand;
use marigold_storefront::Storefront;
use marigold_storefront::models::{ProductQuery, ProductSort};
use rust_decimal::Decimal;

use crate::{CliResult, render};

#[derive(Subcommand)]
pub enum ProductAction {
    /// List products
    List {
        /// Category slug
        #[arg(short, long)]
        category: Option<String>,
        /// Free-text search
        #[arg(short, long)]
        search: Option<String>,
        /// Sort order (`newest`, `price_asc`, `price_desc`, `popular`, `rating`)
        #[arg(long)]
        sort: Option<ProductSort>,
        /// Minimum price
        #[arg(long)]
        min_price: Option<Decimal>,
        /// Maximum price
        #[arg(long)]
        max_price: Option<Decimal>,
        /// Only products with stock
        #[arg(long)]
        in_stock: bool,
        /// Page number
        #[arg(short, long, default_value_t = 1)]
        page: u32,
        /// Products per page
        #[arg(long)]
        per_page: Option<u32>,
    },
    /// Show a product with its variants
    Show {
        /// Product slug
        slug: String,
    },
    /// Products related to a product
    Related {
        /// Product slug
        slug: String,
    },
    /// Customer reviews of a product
    Reviews {
        /// Product slug
        slug: String,
        /// Page number
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
}

pub async fn products(storefront: &Storefront, action: ProductAction, out: &mut impl Write) -> CliResult {
    let catalog = storefront.products();

    match action {
        ProductAction::List {
            category,
            search,
            sort,
            min_price,
            max_price,
            in_stock,
            page,
            per_page,
        } => {
            let query = ProductQuery {
                page: Some(page),
                per_page,
                category,
                search,
                sort,
                min_price,
                max_price,
                in_stock: in_stock.then_some(true),
            };
            let page = catalog.list(&query).await?;
            render::product_page(out, &page)?;
        }
        ProductAction::Show { slug } => {
            let product = catalog.get(&slug).await?;
            render::product(out, &product)?;
        }
        ProductAction::Related { slug } => {
            let product = catalog.get(&slug).await?;
            let related = catalog.related(product.id).await?;
            if related.is_empty() {
                writeln!(out, "No related products.")?;
            }
            for product in &related {
                render::product_line(out, product)?;
            }
        }
        ProductAction::Reviews { slug, page } => {
            let product = catalog.get(&slug).await?;
            let reviews = catalog.reviews(product.id, page).await?;
            render::reviews(out, &reviews)?;
        }
    }
    Ok(())
}

pub async fn categories(storefront: &Storefront, out: &mut impl Write) -> CliResult {
    let categories = storefront.products().categories().await?;
    render::categories(out, &categories)?;
    Ok(())
}
