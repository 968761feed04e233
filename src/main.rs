use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use log::{error, info};
use manga_zip_downloader::app_state::AppState;
use manga_zip_downloader::config::Config;
use manga_zip_downloader::controller::ControlMessage;

#[post("/message")]
async fn message(data: web::Data<AppState>, body: web::Json<ControlMessage>) -> impl Responder {
    let response = data.controller.handle(body.into_inner()).await;
    HttpResponse::Ok().json(response)
}

#[get("/status")]
async fn status(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.controller.status().snapshot())
}

#[get("/chapters")]
async fn chapters(data: web::Data<AppState>) -> impl Responder {
    let response = data.controller.handle(ControlMessage::GetChapters).await;
    if response.success {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::InternalServerError().json(response)
    }
}

fn init_logging() {
    use log4rs::append::console::ConsoleAppender;
    use log4rs::config::{Appender, Config as LogConfig, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let Err(file_err) = log4rs::init_file("log4rs.yml", Default::default()) else {
        return;
    };

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} - {m}{n}",
        )))
        .build();
    let config = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(log::LevelFilter::Info));

    match config.map(log4rs::init_config) {
        Ok(Ok(_)) => log::warn!("log4rs.yml not loaded ({}), logging to console", file_err),
        Ok(Err(e)) => eprintln!("Failed to initialise logging: {}", e),
        Err(e) => eprintln!("Invalid logging config: {}", e),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_logging();

    let cfg = Config::load();
    info!("Download directory: {}", cfg.download_dir);
    info!("Data file: {}", cfg.data_file);
    info!("Browser enabled: {}", cfg.browser.enabled);

    let ports = cfg.ports();
    let data = match AppState::build(cfg) {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            error!("Startup failed: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
        }
    };

    // Try to bind to the first available port in the configured range
    let mut last_err: Option<std::io::Error> = None;
    for port in ports.clone() {
        let data_clone = data.clone();
        let addr = format!("127.0.0.1:{}", port);
        match HttpServer::new(move || {
            App::new()
                .app_data(data_clone.clone())
                .service(message)
                .service(status)
                .service(chapters)
        })
        .bind(&addr)
        {
            Ok(server) => {
                info!("Listening on {}", addr);
                return server.run().await;
            }
            Err(e) => {
                last_err = Some(e);
                continue;
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            format!("No available ports {}-{}", ports.start(), ports.end()),
        )
    }))
}
