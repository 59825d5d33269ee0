//! Account, profile and address commands.

use std::io::Write;

use clap::{Args, Subcommand};
use marigold_core::AddressId;
use marigold_storefront::models::{AddressInput, ProfileUpdate, RegisterInput};
use marigold_storefront::{SignedIn, Storefront};

use crate::{CliResult, render};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Sign in and merge the guest cart
    Login {
        /// Email address
        #[arg(short, long)]
        email: String,
        /// Password
        #[arg(long, env = "MARIGOLD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account
    Register {
        /// Email address
        #[arg(short, long)]
        email: String,
        /// Password (at least 8 characters)
        #[arg(long, env = "MARIGOLD_PASSWORD", hide_env_values = true)]
        password: String,
        /// First name
        #[arg(long)]
        first_name: Option<String>,
        /// Last name
        #[arg(long)]
        last_name: Option<String>,
        /// Receive marketing email
        #[arg(long)]
        marketing: bool,
    },
    /// Sign out
    Logout,
    /// Show the signed-in customer
    Whoami,
    /// Request a password reset email
    Forgot {
        /// Email address
        #[arg(short, long)]
        email: String,
    },
    /// Set a new password with a reset token
    Reset {
        /// Token from the reset email
        #[arg(short, long)]
        token: String,
        /// New password
        #[arg(long, env = "MARIGOLD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Change the password
    Passwd {
        /// Current password
        #[arg(long, env = "MARIGOLD_CURRENT_PASSWORD", hide_env_values = true)]
        current_password: String,
        /// New password
        #[arg(long, env = "MARIGOLD_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Update profile fields
    Update {
        /// First name
        #[arg(long)]
        first_name: Option<String>,
        /// Last name
        #[arg(long)]
        last_name: Option<String>,
        /// Phone number
        #[arg(long)]
        phone: Option<String>,
        /// Receive marketing email
        #[arg(long)]
        marketing: Option<bool>,
    },
}

#[derive(Args)]
pub struct AddressArgs {
    /// Recipient name
    #[arg(long)]
    name: String,
    /// Address line 1
    #[arg(long)]
    line1: String,
    /// Address line 2
    #[arg(long)]
    line2: Option<String>,
    /// City
    #[arg(long)]
    city: String,
    /// State or province
    #[arg(long)]
    state: Option<String>,
    /// Postal code
    #[arg(long)]
    postal_code: String,
    /// Country
    #[arg(long)]
    country: String,
    /// Phone number
    #[arg(long)]
    phone: Option<String>,
    /// Make this the default address
    #[arg(long)]
    default: bool,
}

impl From<AddressArgs> for AddressInput {
    fn from(args: AddressArgs) -> Self {
        Self {
            full_name: args.name,
            line1: args.line1,
            line2: args.line2,
            city: args.city,
            state: args.state,
            postal_code: args.postal_code,
            country: args.country,
            phone: args.phone,
            is_default: args.default,
        }
    }
}

#[derive(Subcommand)]
pub enum AddressAction {
    /// List saved addresses
    List,
    /// Save a new address
    Add(AddressArgs),
    /// Replace an address
    Update {
        /// Address ID
        id: AddressId,
        #[command(flatten)]
        address: AddressArgs,
    },
    /// Delete an address
    Remove {
        /// Address ID
        id: AddressId,
    },
    /// Make an address the default
    Default {
        /// Address ID
        id: AddressId,
    },
}

pub async fn auth(storefront: &Storefront, action: AuthAction, out: &mut impl Write) -> CliResult {
    let auth = storefront.auth();

    match action {
        AuthAction::Login { email, password } => {
            let signed_in = storefront.login(&email, &password).await?;
            report_sign_in(out, &signed_in)?;
        }
        AuthAction::Register {
            email,
            password,
            first_name,
            last_name,
            marketing,
        } => {
            let signed_in = storefront
                .register(RegisterInput {
                    email,
                    password,
                    first_name,
                    last_name,
                    accepts_marketing: marketing,
                })
                .await?;
            report_sign_in(out, &signed_in)?;
        }
        AuthAction::Logout => {
            storefront.logout().await?;
            writeln!(out, "Signed out.")?;
        }
        AuthAction::Whoami => {
            let user = auth.current_user().await?;
            render::user(out, &user)?;
        }
        AuthAction::Forgot { email } => {
            auth.forgot_password(&email).await?;
            writeln!(out, "If an account exists for {email}, a reset link is on its way.")?;
        }
        AuthAction::Reset { token, password } => {
            auth.reset_password(&token, &password).await?;
            writeln!(out, "Password reset. You can now sign in.")?;
        }
        AuthAction::Passwd {
            current_password,
            password,
        } => {
            auth.change_password(&current_password, &password).await?;
            writeln!(out, "Password changed.")?;
        }
    }
    Ok(())
}

fn report_sign_in(out: &mut impl Write, signed_in: &SignedIn) -> std::io::Result<()> {
    writeln!(out, "Signed in as {}.", signed_in.user.display_name())?;
    match &signed_in.cart {
        Ok(summary) if summary.item_count > 0 => writeln!(
            out,
            "Your cart has {} items ({}).",
            summary.item_count, summary.total
        ),
        Ok(_) => Ok(()),
        Err(e) => writeln!(
            out,
            "Your guest cart could not be merged yet and is kept on this device: {}",
            e.user_message()
        ),
    }
}

pub async fn profile(storefront: &Storefront, action: ProfileAction, out: &mut impl Write) -> CliResult {
    match action {
        ProfileAction::Update {
            first_name,
            last_name,
            phone,
            marketing,
        } => {
            let user = storefront
                .auth()
                .update_profile(&ProfileUpdate {
                    first_name,
                    last_name,
                    phone,
                    accepts_marketing: marketing,
                })
                .await?;
            render::user(out, &user)?;
        }
    }
    Ok(())
}

pub async fn address(storefront: &Storefront, action: AddressAction, out: &mut impl Write) -> CliResult {
    let addresses = storefront.addresses();

    match action {
        AddressAction::List => {
            let list = addresses.list().await?;
            render::addresses(out, &list)?;
        }
        AddressAction::Add(args) => {
            let address = addresses.create(&args.into()).await?;
            render::address_line(out, &address)?;
        }
        AddressAction::Update { id, address } => {
            let address = addresses.update(id, &address.into()).await?;
            render::address_line(out, &address)?;
        }
        AddressAction::Remove { id } => {
            addresses.delete(id).await?;
            writeln!(out, "Address {id} deleted.")?;
        }
        AddressAction::Default { id } => {
            let address = addresses.set_default(id).await?;
            render::address_line(out, &address)?;
        }
    }
    Ok(())
}
