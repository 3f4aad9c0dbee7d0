//! GET and POST command handlers

use super::utils::{request_options, request_payload};
use super::Context;
use crate::cli::{PostArgs, RequestArgs};
use crate::error::{Error, Result};
use crate::logging::timing::Timer;
use crate::output::{OutputWriter, ResponseView};
use gclient_core::{Method, RequestOptions, ServiceClientFactory};
use tracing::{debug, info, instrument};

/// Handle the get command
#[instrument(skip_all, fields(service = %args.service, endpoint = %args.endpoint))]
pub async fn handle_get(args: RequestArgs, context: &Context, output: &mut OutputWriter) -> Result<()> {
    let options = request_options(&args.headers, &args.params)?;
    execute(Method::Get, &args, options, context, output).await
}

/// Handle the post command
#[instrument(skip_all, fields(service = %args.request.service, endpoint = %args.request.endpoint))]
pub async fn handle_post(args: PostArgs, context: &Context, output: &mut OutputWriter) -> Result<()> {
    let mut options = request_options(&args.request.headers, &args.request.params)?;
    if let Some(payload) = request_payload(&args.form, args.json.as_deref())? {
        options = options.payload(payload);
    }
    execute(Method::Post, &args.request, options, context, output).await
}

async fn execute(
    method: Method,
    args: &RequestArgs,
    options: RequestOptions,
    context: &Context,
    output: &mut OutputWriter,
) -> Result<()> {
    let timer = Timer::with_details("request", &format!("{} {}{}", method, args.service, args.endpoint));

    debug!(profiles_dir = %context.profiles_dir.display(), "building client");
    let factory = ServiceClientFactory::from_dir(context.profiles_dir.clone());
    let client = factory.build(&args.service, context.proxy.as_deref())?;

    let spinner = output.spinner(&format!("{} {}{}", method, client.base_api(), args.endpoint));
    let result = client.request(method, &args.endpoint, options).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let response = result?;

    let view = ResponseView::from_response(&response, timer.elapsed());
    info!(status = view.status, elapsed_ms = view.elapsed_ms, "request completed");

    output.response(&view, args.include)?;

    if !view.is_success() {
        if args.fail {
            return Err(Error::RequestFailed { status: view.status });
        }
        output.warning(&format!("Service answered with HTTP {}", view.status))?;
    }

    Ok(())
}
