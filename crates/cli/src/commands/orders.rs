//! Checkout and order history commands.

use std::io::Write;

use clap::{Args, Subcommand};
use marigold_core::{AddressId, OrderId, PaymentMethod};
use marigold_storefront::{CheckoutOptions, Storefront};

use crate::{CliResult, render};

#[derive(Args)]
pub struct CheckoutArgs {
    /// Shipping address ID (defaults to the default address)
    #[arg(short, long)]
    address: Option<AddressId>,
    /// Payment method (`cod`, `card`, `upi`, `wallet`)
    #[arg(short, long, default_value = "card")]
    payment: PaymentMethod,
    /// Delivery notes
    #[arg(short, long)]
    notes: Option<String>,
}

#[derive(Subcommand)]
pub enum OrderAction {
    /// List past orders
    List {
        /// Page number
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// Show an order
    Show {
        /// Order ID
        id: OrderId,
    },
    /// Cancel an order that has not shipped
    Cancel {
        /// Order ID
        id: OrderId,
    },
}

pub async fn checkout(storefront: &Storefront, args: CheckoutArgs, out: &mut impl Write) -> CliResult {
    let order = storefront
        .checkout(CheckoutOptions {
            address_id: args.address,
            payment_method: args.payment,
            notes: args.notes,
        })
        .await?;

    writeln!(out, "Thank you! Order {} placed.\n", order.number)?;
    render::order(out, &order)?;
    Ok(())
}

pub async fn orders(storefront: &Storefront, action: OrderAction, out: &mut impl Write) -> CliResult {
    let orders = storefront.orders();

    match action {
        OrderAction::List { page } => {
            let page = orders.list(page).await?;
            render::orders(out, &page)?;
        }
        OrderAction::Show { id } => {
            let order = orders.get(id).await?;
            render::order(out, &order)?;
        }
        OrderAction::Cancel { id } => {
            let order = orders.cancel(id).await?;
            writeln!(out, "Order {} is now {}.", order.number, order.status)?;
        }
    }
    Ok(())
}
