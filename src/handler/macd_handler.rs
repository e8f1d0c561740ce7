use super::config::MacdOptions;
use crate::indicators::{compute_macd, MacdResult};
use async_std::{channel::Sender, sync::Mutex};
use async_trait::async_trait;
use kapacitor_udf::{
    proto::{
        response, BeginBatch, EdgeType, EndBatch, InfoResponse, InitRequest, InitResponse, Point,
        Response, RestoreRequest, RestoreResponse, SnapshotResponse,
    },
    traits::Handler,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, io, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, instrument, trace, warn};

#[derive(Debug, Error)]
pub enum MacdHandlerError {
    #[error("Failed to send response: {0}")]
    ResponseSendError(String),
    #[error("EndBatch called without BeginBatch")]
    MissingBeginBatch,
}

impl From<MacdHandlerError> for io::Error {
    fn from(e: MacdHandlerError) -> Self {
        io::Error::new(io::ErrorKind::Other, e)
    }
}

/// What survives a Kapacitor snapshot. Batches are computed from scratch, so
/// only the active options are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HandlerSnapshot {
    options: MacdOptions,
}

/// Batch handler that annotates every point with MACD, signal, histogram and
/// crossover values computed per ticker.
pub struct MacdHandler {
    responses: Arc<Mutex<Sender<Response>>>,
    options: MacdOptions,
    batch_points: Vec<Point>,
    begin_batch: Option<BeginBatch>,
}

impl MacdHandler {
    /// Creates a new `MacdHandler`.
    ///
    /// # Arguments
    ///
    /// * `responses` - Channel the agent forwards to Kapacitor.
    /// * `options` - Options in effect until an `InitRequest` overrides them.
    ///
    /// # Returns
    ///
    /// A handler with an empty batch buffer.
    #[instrument(skip(responses))]
    pub fn new(responses: Arc<Mutex<Sender<Response>>>, options: MacdOptions) -> Self {
        debug!("Creating new MacdHandler");
        MacdHandler {
            responses,
            options,
            batch_points: Vec::new(),
            begin_batch: None,
        }
    }

    pub fn options(&self) -> &MacdOptions {
        &self.options
    }

    async fn send_response(&self, response: Response) -> Result<(), MacdHandlerError> {
        trace!("Sending response: {:?}", response);

        let sender = self.responses.lock().await;
        sender.send(response).await.map_err(|e| {
            error!("Failed to send response: {}", e);
            MacdHandlerError::ResponseSendError(e.to_string())
        })
    }
}

/// Returns copies of `points` carrying the indicator fields for their ticker.
///
/// Points keep their order. A point is annotated only when its position in
/// the ticker's series has a value: the MACD line starts `long - 1` points in,
/// the signal line and histogram `signal - 1` points later. Tickers with too
/// few points pass through unchanged.
pub fn annotate_batch(points: &[Point], options: &MacdOptions) -> Vec<Point> {
    let mut annotated = points.to_vec();

    let mut series: HashMap<&str, (Vec<usize>, Vec<f64>)> = HashMap::new();
    for (idx, p) in points.iter().enumerate() {
        let ticker = p.tags.get(&options.ticker_field);
        let value = p.fields_double.get(&options.field);
        if let (Some(ticker), Some(value)) = (ticker, value) {
            let (indices, prices) = series.entry(ticker.as_str()).or_default();
            indices.push(idx);
            prices.push(*value);
        }
    }

    for (ticker, (indices, prices)) in series {
        let result = compute_macd(&prices, options.parameters());
        if let Some(reason) = result.error() {
            warn!("Skipping ticker {}: {}", ticker, reason);
            continue;
        }
        debug!(
            "Ticker {}: {} prices, {} MACD values, {} crossovers",
            ticker,
            prices.len(),
            result.macd_line().len(),
            result.signals().len()
        );
        apply_result(&mut annotated, &indices, &result, options);
    }

    annotated
}

fn apply_result(points: &mut [Point], indices: &[usize], result: &MacdResult, options: &MacdOptions) {
    let n = indices.len();
    let macd_start = n - result.macd_line().len();
    let signal_start = n - result.signal_line().len();

    let signal_field = options.signal_field();
    let histogram_field = options.histogram_field();
    let crossover_field = options.crossover_field();

    for (pos, &macd) in result.macd_line().iter().enumerate() {
        points[indices[macd_start + pos]]
            .fields_double
            .insert(options.as_field.clone(), macd);
    }

    let aligned = result.signal_line().iter().zip(result.histogram());
    for (pos, (&signal, &histogram)) in aligned.enumerate() {
        let fields = &mut points[indices[signal_start + pos]].fields_double;
        fields.insert(signal_field.clone(), signal);
        fields.insert(histogram_field.clone(), histogram);
    }

    for event in result.signals() {
        points[indices[signal_start + event.position]]
            .fields_string
            .insert(crossover_field.clone(), event.kind.to_string());
    }
}

#[async_trait]
impl Handler for MacdHandler {
    #[instrument(skip(self))]
    async fn info(&self) -> io::Result<InfoResponse> {
        debug!("Info request received");
        let info = InfoResponse {
            wants: EdgeType::Batch.into(),
            provides: EdgeType::Batch.into(),
            options: self.options.to_option_info(),
        };
        trace!("Responding with info: {:?}", info);
        Ok(info)
    }

    #[instrument(skip(self, r))]
    async fn init(&mut self, r: &InitRequest) -> io::Result<InitResponse> {
        debug!("Init request received: {:?}", r);
        match MacdOptions::from_proto_options(&self.options, &r.options) {
            Ok(options) => {
                debug!("Initialized with {:?}", options);
                self.options = options;
                self.batch_points.clear();
                self.begin_batch = None;
                Ok(InitResponse {
                    success: true,
                    error: String::new(),
                })
            }
            Err(e) => {
                error!("Failed to initialize: {}", e);
                Ok(InitResponse {
                    success: false,
                    error: e.to_string(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn snapshot(&self) -> io::Result<SnapshotResponse> {
        debug!("Snapshot request received");
        let snapshot = serde_json::to_vec(&HandlerSnapshot {
            options: self.options.clone(),
        })
        .map_err(|e| {
            error!("Failed to serialize state: {}", e);
            io::Error::new(io::ErrorKind::Other, e)
        })?;
        Ok(SnapshotResponse { snapshot })
    }

    #[instrument(skip(self, req))]
    async fn restore(&mut self, req: &RestoreRequest) -> io::Result<RestoreResponse> {
        debug!("Restore request received");
        match serde_json::from_slice::<HandlerSnapshot>(&req.snapshot) {
            Ok(snapshot) => {
                self.options = snapshot.options;
                self.batch_points.clear();
                self.begin_batch = None;
                Ok(RestoreResponse {
                    success: true,
                    error: String::new(),
                })
            }
            Err(e) => {
                error!("Failed to restore state: {}", e);
                Ok(RestoreResponse {
                    success: false,
                    error: e.to_string(),
                })
            }
        }
    }

    #[instrument(skip(self, begin))]
    async fn begin_batch(&mut self, begin: &BeginBatch) -> io::Result<()> {
        debug!("BeginBatch called: {:?}", begin);
        self.begin_batch = Some(begin.clone());
        self.batch_points.clear();
        Ok(())
    }

    #[instrument(skip(self, p), fields(point_name = %p.name, point_time = %p.time))]
    async fn point(&mut self, p: &Point) -> io::Result<()> {
        trace!("Processing point: {:?}", p);

        match p.tags.get(&self.options.ticker_field) {
            Some(ticker) if p.fields_double.contains_key(&self.options.field) => {
                self.batch_points.push(p.clone());
                trace!(
                    "Buffered point for {}. Current batch size: {}",
                    ticker,
                    self.batch_points.len()
                );
            }
            Some(ticker) => warn!("Missing '{}' value for ticker: {}", self.options.field, ticker),
            None => warn!("Missing '{}' tag on point", self.options.ticker_field),
        }

        Ok(())
    }

    #[instrument(skip(self, end))]
    async fn end_batch(&mut self, end: &EndBatch) -> io::Result<()> {
        debug!("EndBatch called: {:?}", end);

        let begin = self.begin_batch.take().ok_or_else(|| {
            error!("EndBatch received before any BeginBatch");
            MacdHandlerError::MissingBeginBatch
        })?;

        let points = std::mem::take(&mut self.batch_points);
        let annotated = annotate_batch(&points, &self.options);

        self.send_response(Response {
            message: Some(response::Message::Begin(begin)),
        })
        .await?;

        for point in annotated {
            self.send_response(Response {
                message: Some(response::Message::Point(point)),
            })
            .await?;
        }

        self.send_response(Response {
            message: Some(response::Message::End(end.clone())),
        })
        .await?;

        debug!("Batch of {} points sent", points.len());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&mut self) {
        debug!("Stop called, closing agent responses");
        let _ = self.responses.lock().await.close();
        debug!("MacdHandler stopped");
    }
}

impl std::fmt::Debug for MacdHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacdHandler")
            .field("options", &self.options)
            .field("data_points_count", &self.batch_points.len())
            .finish()
    }
}
