use std::error::Error;
use std::sync::Arc;

use futures::future::FutureExt;
use tokio::sync::mpsc;
use warp::Filter;

use pelodata::config::get_variable;
use pelodata::environment::Environment;
use pelodata::log::{info, initialize_logger};
use pelodata::peloton::Peloton;
use pelodata::routes;
use pelodata::routes::admin::TerminationFunction;
use pelodata::store::DynamoStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = initialize_logger();

    let main_port: u16 = get_variable("BACKEND_PORT")
        .parse()
        .expect("parse BACKEND_PORT as u16");
    let admin_port: u16 = get_variable("BACKEND_ADMIN_PORT")
        .parse()
        .expect("parse BACKEND_ADMIN_PORT as u16");

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    let store = Arc::new(DynamoStore::from_env().expect("initialize table store from environment"));
    let peloton = Arc::new(Peloton::from_env());

    let environment = Environment::new(logger.clone(), store, peloton);

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate: TerminationFunction = Arc::new(move || {
        let termination_sender = termination_sender.clone();

        async move {
            termination_sender.send(()).await.ok();
        }
        .boxed()
    });

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate().await;
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let logger2 = logger.clone();

        let routes = routes::make_login_route(environment.clone())
            .or(routes::make_workouts_route(environment.clone()))
            .or(routes::make_filters_route(environment.clone()))
            .or(routes::make_categories_route(environment.clone()))
            .or(routes::make_user_info_route(environment.clone()))
            .or(routes::make_bookmark_route(environment.clone()))
            .or(routes::make_unbookmark_route(environment.clone()))
            .or(routes::make_create_program_route(environment.clone()))
            .or(routes::make_programs_route(environment.clone()))
            .or(routes::make_program_route(environment.clone()))
            .or(routes::make_delete_program_route(environment.clone()))
            .or(routes::make_create_challenge_route(environment.clone()))
            .or(routes::make_challenges_route(environment.clone()))
            .or(routes::make_challenge_route(environment.clone()))
            .or(routes::make_delete_challenge_route(environment.clone()))
            .or(routes::make_recommend_route(environment.clone()))
            .or(routes::make_recommendations_route(environment.clone()))
            .or(routes::make_recommendation_route(environment.clone()))
            .or(routes::make_delete_recommendation_route(environment.clone()))
            .recover(move |r| routes::format_rejection(logger2.clone(), r));

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), {
                let should_terminate = should_terminate.clone();

                async move {
                    should_terminate.await;
                }
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();

        let routes = routes::admin::make_healthz_route(environment.clone()).or(
            routes::admin::make_termination_route(environment, terminate),
        );

        let (_, admin_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], admin_port), async {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}
