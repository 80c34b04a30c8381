use std::env;

use clap::Parser;
use log::info;
use mongodb::{Client, Database, options::ClientOptions};
use simple_logger::SimpleLogger;

mod authentication;
mod error;
mod http_api;
mod order_datatypes;
mod product;
mod rating_aggregator;
mod recompute;
mod review;
mod review_like;
mod review_page;
mod review_service;

use review_service::ReviewService;

/// Establishes database connection and returns the client.
async fn db_connection() -> Client {
    let uri = match env::var_os("MONGODB_URI") {
        Some(uri) => uri.into_string().unwrap(),
        None => panic!("$MONGODB_URI is not set."),
    };

    let mut client_options = ClientOptions::parse(uri).await.unwrap();
    client_options.app_name = Some("StorefrontReview".to_string());

    Client::with_options(client_options).unwrap()
}

/// Command line arguments to run one-shot maintenance jobs instead of the service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Rebuilds every product's rating snapshot from its published reviews.
    #[arg(long)]
    recompute_ratings: bool,
    /// Rebuilds every review's like counter from the like records.
    #[arg(long)]
    recompute_likes: bool,
}

/// Activates logger and parses arguments for optional maintenance jobs.
/// Otherwise starts the REST server.
#[tokio::main]
async fn main() {
    SimpleLogger::new().init().unwrap();

    let args = Args::parse();
    let client = db_connection().await;
    let db_client: Database = client.database("storefront-database");

    if args.recompute_ratings || args.recompute_likes {
        if args.recompute_ratings {
            recompute::recompute_rating_snapshots(&db_client).await.unwrap();
        }
        if args.recompute_likes {
            recompute::recompute_like_counts(&db_client).await.unwrap();
        }
    } else {
        start_service(db_client).await;
    }
}

/// Starts the review service on port 8080.
async fn start_service(db_client: Database) {
    ReviewService::ensure_indexes(&db_client).await.unwrap();
    let service = ReviewService::new(&db_client);
    let app = http_api::router(service);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
    info!("Review service: http://0.0.0.0:8080");
    axum::serve(listener, app).await.unwrap();
}
