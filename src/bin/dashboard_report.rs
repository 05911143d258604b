//! Utility to log in to a running CRM API and print the dashboard summary.

use anyhow::Context;
use dotenvy::dotenv;
use rust_crm_api::client::CrmClient;
use rust_crm_api::config::Config;
use rust_crm_api::token_store::TokenStore;
use std::env;

/// Local server address on the port the API listens on by default.
fn default_api_url() -> String {
    format!("http://localhost:{}", Config::default().port)
}

/// Main entry point for the dashboard report.
///
/// Reads `CRM_API_URL` (default `http://localhost:3000`), `CRM_EMAIL` and
/// `CRM_PASSWORD`, logs in for this run only, then prints the figures.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_crm_api=info".into()),
        )
        .init();

    let base_url = env::var("CRM_API_URL").unwrap_or_else(|_| default_api_url());
    let email = env::var("CRM_EMAIL").context("CRM_EMAIL must be set")?;
    let password = env::var("CRM_PASSWORD").context("CRM_PASSWORD must be set")?;

    let client = CrmClient::new(&base_url, TokenStore::session())?;
    let user = client.login(&email, &password, false).await?;
    let summary = client.dashboard().await?;

    println!("Dashboard for {} ({})", user.name, user.email);
    println!();
    println!("Customers:        {}", summary.total_customers);
    println!("Leads:            {}", summary.total_leads);
    println!("Pipeline value:   {}", summary.pipeline_value);
    println!("Converted value:  {}", summary.converted_value);
    println!("Conversion rate:  {:.1}%", summary.conversion_rate * 100.0);

    println!();
    println!("By status:");
    for row in &summary.by_status {
        println!("  - {:<10} {:>4}  {}", row.status.as_str(), row.count, row.value);
    }

    println!();
    println!("New customers per month:");
    for month in &summary.customers_per_month {
        println!("  - {}: {}", month.month, month.count);
    }

    if !summary.top_customers.is_empty() {
        println!();
        println!("Top customers by lead value:");
        for customer in &summary.top_customers {
            println!(
                "  - {} ({} lead(s)): {}",
                customer.name, customer.lead_count, customer.total_value
            );
        }
    }

    client.logout().await?;
    Ok(())
}
