use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use agrirent::app::{App, SignUpForm};
use agrirent::backend::{Backend, HostedClient};
use agrirent::booking::BookingIds;
use agrirent::config;
use agrirent::dashboard::{
    AdminDashboard, Catalogue, FarmerDashboard, ListingForm, OwnerDashboard,
};
use agrirent::db;
use agrirent::filter::{regions, ListingFilter, PriceBracket, Selector};
use agrirent::model::{BookingRecord, Listing, ListingStatus, PaymentOption, Role};
use agrirent::notify::{ConsoleSink, Notifier, TracingSink};
use agrirent::pricing::Quote;
use agrirent::router::Route;

#[derive(Debug, Parser)]
#[command(author, version, about = "Farm equipment rental marketplace client")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search available equipment
    Browse {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "All")]
        category: String,
        #[arg(long, default_value = "All")]
        region: String,
        /// e.g. "Under 200", "200-400", "Over 600"
        #[arg(long, default_value = "All")]
        price: String,
    },
    /// Price a rental without booking it
    Quote {
        #[arg(long)]
        rate: f64,
        #[arg(long, default_value = "1")]
        days: String,
        #[arg(long, default_value = "advance")]
        payment: PaymentOption,
    },
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        region: String,
        /// farmer or owner
        #[arg(long, default_value = "farmer")]
        role: String,
    },
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Resolve a view token for the signed-in user
    View { token: String },
    /// Book a listing
    Book {
        #[arg(long)]
        listing: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long, default_value = "")]
        address: String,
        #[arg(long)]
        farm_size: Option<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        duration: String,
        #[arg(long)]
        purpose: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, default_value = "advance")]
        payment: PaymentOption,
    },
    /// Admin: listings awaiting approval
    Pending,
    /// Admin: approve a pending listing
    Approve { id: Uuid },
    /// Admin: reject (delete) a pending listing
    Reject { id: Uuid },
    /// Admin: list notifications
    Notifications,
    /// Admin: mark a notification as read
    Read { id: Uuid },
    /// Farmer: your active rentals and booking history
    MyBookings,
    /// Owner: list your equipment
    MyListings,
    /// Owner: submit new equipment for approval
    AddListing {
        #[arg(long)]
        name: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        rate: String,
        #[arg(long)]
        region: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        image_url: String,
    },
}

struct Ctx {
    pool: db::Pool,
    client: Arc<HostedClient>,
    app: App,
}

impl Ctx {
    async fn connect(config_path: &Path) -> Result<Self> {
        let cfg = config::load(Some(config_path))?;
        cfg.ensure_dirs()?;

        let pool = db::init_pool(&cfg.database_url()).await?;
        db::run_migrations(&pool).await?;

        let client = Arc::new(HostedClient::new(
            cfg.backend_url()?,
            cfg.backend.anon_key.clone(),
        )?);
        let notifier = Notifier::new()
            .with_sink(Arc::new(ConsoleSink))
            .with_sink(Arc::new(TracingSink));
        let mut app = App::new(client.clone(), notifier);

        let cached = db::load_session(&pool, Utc::now()).await?;
        client.restore_session(cached).await;
        if let Err(err) = app.sync_auth().await {
            warn!(?err, "continuing without a signed-in user");
        }
        Ok(Self { pool, client, app })
    }

    async fn persist_session(&self) -> Result<()> {
        match self.client.session().await {
            Some(session) => db::save_session(&self.pool, &session).await,
            None => db::clear_session(&self.pool).await,
        }
    }
}

fn print_listing(listing: &Listing) {
    println!(
        "{}  {:<28} {:<10} {:<14} ₹{}/day  [{}]{}",
        listing.id,
        listing.name,
        listing.category,
        listing.region,
        listing.daily_rate,
        listing.status,
        listing
            .owner_name
            .as_deref()
            .map(|o| format!("  owner: {}", o))
            .unwrap_or_default()
    );
}

fn print_booking(booking: &BookingRecord) {
    println!(
        "{}  {} → {}  {:>3}d  ₹{:<10} paid ₹{:<10} [{}]",
        booking.booking_id,
        booking.start_date,
        booking.end_date,
        booking.duration_days,
        booking.total_amount,
        booking.payable_amount,
        booking.status
    );
}

fn price_brackets() -> String {
    PriceBracket::defaults()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_quote(quote: &Quote) {
    println!("Daily rate      ₹{}", quote.daily_rate);
    println!(
        "Duration        {} day{}",
        quote.duration_days,
        if quote.duration_days > 1 { "s" } else { "" }
    );
    println!("Subtotal        ₹{}", quote.total_amount);
    println!("Amount to pay   ₹{}", quote.payable_amount);
    match quote.payment_option {
        PaymentOption::Advance => println!("Remaining ₹{} due on delivery", quote.balance_due()),
        PaymentOption::Full => println!(
            "5% discount applied (₹{} saved)",
            quote.displayed_discount
        ),
    }
}

fn print_route(route: &Route) {
    match route {
        Route::Render { view, user } => match user {
            Some(u) => println!("{} ({} as {})", view, u.name, u.role),
            None => println!("{}", view),
        },
        Route::RedirectToLogin { requested } => {
            println!("{} requires login; showing login", requested)
        }
        Route::Forbidden { requested, role } => {
            println!("{} is not available to {} accounts", requested, role)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    // Quoting is pure arithmetic and needs neither config nor backend.
    let command = match args.command {
        Command::Quote {
            rate,
            days,
            payment,
        } => {
            print_quote(&Quote::from_input(rate, &days, payment));
            return Ok(());
        }
        other => other,
    };

    let mut ctx = Ctx::connect(&args.config).await?;

    match command {
        Command::Quote { .. } => {}
        Command::Browse {
            search,
            category,
            region,
            price,
        } => {
            let filter = ListingFilter {
                search,
                category: category.parse().map_err(|e: String| anyhow!(e))?,
                region: region.parse::<Selector<String>>().unwrap_or_default(),
                price: price
                    .parse()
                    .map_err(|e: String| anyhow!("{}; try one of: {}", e, price_brackets()))?,
            };
            let catalogue = Catalogue::load(ctx.app.backend(), ctx.app.notifier()).await?;
            if let Selector::Only(wanted) = &filter.region {
                let known = regions(&catalogue.listings);
                if !known.contains(wanted) {
                    ctx.app.notifier().info(format!(
                        "No equipment listed in {}. Regions: {}",
                        wanted,
                        known.join(", ")
                    ));
                }
            }
            let found = catalogue.search(&filter);
            for listing in &found {
                print_listing(listing);
            }
            println!("{}", catalogue.summary(found.len()));
        }
        Command::Login { email, password } => {
            ctx.app.sign_in(&email, &password).await?;
            ctx.persist_session().await?;
            print_route(&ctx.app.state().render());
        }
        Command::Signup {
            email,
            password,
            name,
            phone,
            region,
            role,
        } => {
            let role = Role::from_tag(&role)
                .ok_or_else(|| anyhow!("unknown role '{}'; use farmer or owner", role))?;
            let form = SignUpForm {
                email,
                password,
                name,
                phone,
                region,
                role: Some(role),
            };
            ctx.app.sign_up(&form).await?;
        }
        Command::Logout => {
            let result = ctx.app.sign_out().await;
            db::clear_session(&ctx.pool).await?;
            result?;
            print_route(&ctx.app.state().render());
        }
        Command::Whoami => match ctx.app.state().user() {
            Some(u) => println!(
                "{} <{}> {}",
                u.name,
                u.email.as_deref().unwrap_or("-"),
                u.role
            ),
            None => println!("Not signed in"),
        },
        Command::View { token } => {
            let route = ctx.app.state_mut().navigate(&token);
            print_route(&route);
        }
        Command::Book {
            listing,
            name,
            email,
            phone,
            address,
            farm_size,
            start,
            end,
            duration,
            purpose,
            notes,
            payment,
        } => {
            let catalogue = Catalogue::load(ctx.app.backend(), ctx.app.notifier()).await?;
            let target = catalogue
                .find(listing)
                .cloned()
                .with_context(|| format!("no available listing {}", listing))?;
            let mut flow = ctx.app.open_booking(target)?;
            if let Some(name) = name {
                flow.form.full_name = name;
            }
            if let Some(email) = email {
                flow.form.email = email;
            }
            if let Some(phone) = phone {
                flow.form.phone = phone;
            }
            flow.form.address = address;
            flow.form.farm_size = farm_size;
            flow.form.start_date = start;
            flow.form.end_date = end;
            flow.form.duration = duration;
            flow.form.purpose = purpose;
            flow.form.special_requirements = notes;
            flow.form.payment_option = payment;

            print_quote(&flow.quote());
            let ids = BookingIds::new();
            flow.submit(ctx.app.backend(), ctx.app.notifier(), &ids, |c| {
                info!(booking_id = %c.booking_id, "booking complete");
            })
            .await?;
        }
        Command::Pending => {
            let user = ctx.app.state().user().cloned();
            let dashboard =
                AdminDashboard::open(ctx.app.backend(), ctx.app.notifier(), user.as_ref()).await?;
            for listing in &dashboard.pending {
                print_listing(listing);
            }
            println!("{} pending", dashboard.pending.len());
        }
        Command::Approve { id } => {
            let user = ctx.app.state().user().cloned();
            let mut dashboard =
                AdminDashboard::open(ctx.app.backend(), ctx.app.notifier(), user.as_ref()).await?;
            dashboard.approve(id).await?;
        }
        Command::Reject { id } => {
            let user = ctx.app.state().user().cloned();
            let mut dashboard =
                AdminDashboard::open(ctx.app.backend(), ctx.app.notifier(), user.as_ref()).await?;
            dashboard.reject(id).await?;
        }
        Command::Notifications => {
            let user = ctx.app.state().user().cloned();
            let dashboard =
                AdminDashboard::open(ctx.app.backend(), ctx.app.notifier(), user.as_ref()).await?;
            for n in &dashboard.notifications {
                println!(
                    "{} {} {}: {}",
                    n.id,
                    if n.is_read { " " } else { "*" },
                    n.title,
                    n.message
                );
            }
            println!("{} unread", dashboard.unread_count());
        }
        Command::Read { id } => {
            let user = ctx.app.state().user().cloned();
            let mut dashboard =
                AdminDashboard::open(ctx.app.backend(), ctx.app.notifier(), user.as_ref()).await?;
            dashboard.mark_read(id).await?;
            println!("{} unread", dashboard.unread_count());
        }
        Command::MyBookings => {
            let user = ctx.app.state().user().cloned();
            let dashboard = FarmerDashboard::open(
                ctx.app.backend(),
                ctx.app.notifier(),
                user.as_ref(),
                Utc::now().date_naive(),
            )
            .await?;
            println!("Active rentals");
            for booking in &dashboard.active {
                print_booking(booking);
            }
            println!("History");
            for booking in &dashboard.history {
                print_booking(booking);
            }
            println!(
                "{} active, {} completed, ₹{} spent",
                dashboard.active.len(),
                dashboard.completed_count(),
                dashboard.total_spent()
            );
        }
        Command::MyListings => {
            let user = ctx.app.state().user().cloned();
            let dashboard =
                OwnerDashboard::open(ctx.app.backend(), ctx.app.notifier(), user.as_ref()).await?;
            for listing in &dashboard.listings {
                print_listing(listing);
            }
            println!(
                "{} total, {} available, {} pending approval",
                dashboard.listings.len(),
                dashboard.count_by_status(ListingStatus::Available),
                dashboard.count_by_status(ListingStatus::Pending)
            );
        }
        Command::AddListing {
            name,
            category,
            rate,
            region,
            description,
            image_url,
        } => {
            let user = ctx.app.state().user().cloned();
            let mut dashboard =
                OwnerDashboard::open(ctx.app.backend(), ctx.app.notifier(), user.as_ref()).await?;
            let form = ListingForm {
                name,
                category,
                description,
                daily_rate: rate,
                region,
                image_url,
            };
            let created = dashboard.add_listing(&form).await?;
            print_listing(&created);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        error!(?err, "command failed");
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}
