use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::http::{StatusCode, header};
use actix_web::{HttpRequest, HttpResponse, web};
use futures::FutureExt;
use serde_json::json;
use shared::{AccuracyDataResponse, PredictRequest, PredictResponse};
use std::any::Any;
use std::panic::AssertUnwindSafe;

use crate::prediction::service::IMAGE_REQUIRED;
use crate::prediction::{Prediction, PredictionError, PredictionService};

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/api/predict-sign").route(web::post().to(predict)))
        .service(web::resource("/accuracy-data").route(web::get().to(accuracy_data)))
        .service(web::resource("/api/accuracy-data").route(web::get().to(accuracy_data)))
        .service(web::resource("/health").route(web::get().to(health_check)));
}

/// JSON extractor settings for prediction bodies. Rejected bodies still get
/// the `{success, message}` shape.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, req| {
            log::warn!("Rejected request body on {}: {}", req.path(), err);
            let response = match &err {
                JsonPayloadError::OverflowKnownLength { .. }
                | JsonPayloadError::Overflow { .. } => HttpResponse::PayloadTooLarge()
                    .json(PredictResponse::failure("Image payload too large")),
                JsonPayloadError::ContentType => HttpResponse::UnprocessableEntity()
                    .json(PredictResponse::failure("Request body must be JSON")),
                _ => HttpResponse::UnprocessableEntity()
                    .json(PredictResponse::failure(IMAGE_REQUIRED)),
            };
            InternalError::from_response(err, response).into()
        })
}

async fn predict(
    req: HttpRequest,
    service: web::Data<PredictionService>,
    body: web::Json<PredictRequest>,
) -> HttpResponse {
    let image = body.into_inner().image.unwrap_or_default();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    log::info!(
        "🔍 Prediction request received: image length {}, user agent {}, peer {:?}",
        image.len(),
        user_agent,
        req.peer_addr()
    );

    respond(service.predict(&image)).await
}

/// Turns a pipeline run into the response body. A panic inside the pipeline
/// becomes a 500 instead of tearing down the worker.
async fn respond<F>(pipeline: F) -> HttpResponse
where
    F: Future<Output = Result<Prediction, PredictionError>>,
{
    let outcome = AssertUnwindSafe(pipeline)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(PredictionError::Internal(panic_message(panic.as_ref()))));

    match outcome {
        Ok(prediction) => HttpResponse::Ok().json(PredictResponse::success(
            prediction.label,
            prediction.confidence,
            prediction.accuracy,
        )),
        Err(e) => {
            e.log();
            HttpResponse::build(failure_status(&e))
                .json(PredictResponse::failure(e.client_message()))
        }
    }
}

async fn accuracy_data(service: web::Data<PredictionService>) -> HttpResponse {
    HttpResponse::Ok().json(AccuracyDataResponse {
        success: true,
        data: service.accuracy_table().entries().clone(),
    })
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "OK" }))
}

fn failure_status(err: &PredictionError) -> StatusCode {
    if err.is_validation() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else if err.is_internal() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "prediction pipeline panicked".to_string()
    }
}
