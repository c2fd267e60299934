//! Geographic layer extraction and topology rendering worker
//!
//! Network models are stored as JSON exports with top-level `buses` and
//! `lines` arrays (parsing the native power-system formats is out of scope).
//! Extraction turns one of those arrays into a tabular layer for map
//! rendering; topology rendering produces a small SVG stored on the network
//! row.

use super::base::{JobFailure, Worker};
use crate::db;
use crate::queue::{
    Job, JobKind, LayerKind, JOB_TYPE_EXTRACT_LAYER, JOB_TYPE_RENDER_TOPOLOGY,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

pub struct LayerWorker {
    pool: PgPool,
}

impl LayerWorker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_model(&self, file_path: &str) -> Result<Value, JobFailure> {
        let bytes = tokio::fs::read(file_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                JobFailure::not_found(format!("Model file missing: {file_path}"))
            } else {
                JobFailure::io(format!("Cannot read {file_path}: {e}"))
            }
        })?;

        serde_json::from_slice(&bytes)
            .map_err(|e| JobFailure::invalid_model(format!("{file_path} is not a model: {e}")))
    }

    async fn extract(
        &self,
        network_id: Uuid,
        file_path: &str,
        layer: LayerKind,
    ) -> Result<Value, JobFailure> {
        let model = self.load_model(file_path).await?;
        let mut table = extract_layer(&model, layer).map_err(JobFailure::invalid_model)?;
        table["network_id"] = json!(network_id);
        Ok(table)
    }

    async fn render(&self, network_id: Uuid, file_path: &str) -> Result<Value, JobFailure> {
        let model = self.load_model(file_path).await?;
        let svg = render_topology_svg(&model).map_err(JobFailure::invalid_model)?;

        let updated = db::networks::set_topology_svg(&self.pool, network_id, &svg).await?;
        if updated == 0 {
            return Err(JobFailure::not_found(format!(
                "Network {network_id} no longer exists"
            )));
        }

        Ok(json!({
            "network_id": network_id,
            "svg_bytes": svg.len(),
        }))
    }
}

#[async_trait]
impl Worker for LayerWorker {
    fn name(&self) -> &'static str {
        "LayerWorker"
    }

    fn supported_job_types(&self) -> &[&'static str] {
        &[JOB_TYPE_EXTRACT_LAYER, JOB_TYPE_RENDER_TOPOLOGY]
    }

    async fn process_job(&self, job: &Job) -> Result<Value, JobFailure> {
        match job.kind() {
            Ok(JobKind::ExtractLayer {
                network_id,
                file_path,
                layer,
            }) => self.extract(network_id, &file_path, layer).await,
            Ok(JobKind::RenderTopology {
                network_id,
                file_path,
            }) => self.render(network_id, &file_path).await,
            Ok(other) => Err(JobFailure::new(
                crate::queue::error_kind::INTERNAL,
                format!("LayerWorker cannot execute {}", other.job_type_name()),
            )),
            Err(e) => Err(JobFailure::new(
                crate::queue::error_kind::INTERNAL,
                format!("Malformed job parameters: {e}"),
            )),
        }
    }
}

struct Bus {
    id: String,
    x: f64,
    y: f64,
    v_nom: Option<f64>,
}

fn parse_buses(model: &Value) -> Result<Vec<Bus>, String> {
    let buses = model
        .get("buses")
        .and_then(Value::as_array)
        .ok_or_else(|| "model has no buses array".to_string())?;

    buses
        .iter()
        .enumerate()
        .map(|(i, bus)| {
            let id = bus
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("bus {i} has no id"))?
                .to_string();
            let x = bus
                .get("x")
                .and_then(Value::as_f64)
                .ok_or_else(|| format!("bus {id} has no numeric x coordinate"))?;
            let y = bus
                .get("y")
                .and_then(Value::as_f64)
                .ok_or_else(|| format!("bus {id} has no numeric y coordinate"))?;
            Ok(Bus {
                id,
                x,
                y,
                v_nom: bus.get("v_nom").and_then(Value::as_f64),
            })
        })
        .collect()
}

struct Line {
    id: String,
    bus0: String,
    bus1: String,
    s_nom: Option<f64>,
}

fn parse_lines(model: &Value) -> Result<Vec<Line>, String> {
    let lines = model
        .get("lines")
        .and_then(Value::as_array)
        .ok_or_else(|| "model has no lines array".to_string())?;

    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let id = line
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("line {i} has no id"))?
                .to_string();
            let bus0 = line
                .get("bus0")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("line {id} has no bus0 endpoint"))?
                .to_string();
            let bus1 = line
                .get("bus1")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("line {id} has no bus1 endpoint"))?
                .to_string();
            Ok(Line {
                id,
                bus0,
                bus1,
                s_nom: line.get("s_nom").and_then(Value::as_f64),
            })
        })
        .collect()
}

/// Extract one geographic layer from a model as a column/row table.
pub(crate) fn extract_layer(model: &Value, layer: LayerKind) -> Result<Value, String> {
    match layer {
        LayerKind::Buses => {
            let buses = parse_buses(model)?;
            let rows: Vec<Value> = buses
                .iter()
                .map(|b| json!([b.id, b.x, b.y, b.v_nom]))
                .collect();
            Ok(json!({
                "layer": "buses",
                "columns": ["id", "x", "y", "v_nom"],
                "rows": rows,
            }))
        }
        LayerKind::Lines => {
            let buses = parse_buses(model)?;
            let coords: HashMap<&str, (f64, f64)> = buses
                .iter()
                .map(|b| (b.id.as_str(), (b.x, b.y)))
                .collect();

            let lines = parse_lines(model)?;
            let rows = lines
                .iter()
                .map(|line| {
                    let (x0, y0) = coords
                        .get(line.bus0.as_str())
                        .ok_or_else(|| format!("line {} references unknown bus {}", line.id, line.bus0))?;
                    let (x1, y1) = coords
                        .get(line.bus1.as_str())
                        .ok_or_else(|| format!("line {} references unknown bus {}", line.id, line.bus1))?;
                    Ok(json!([line.id, line.bus0, line.bus1, x0, y0, x1, y1, line.s_nom]))
                })
                .collect::<Result<Vec<Value>, String>>()?;

            Ok(json!({
                "layer": "lines",
                "columns": ["id", "bus0", "bus1", "x0", "y0", "x1", "y1", "s_nom"],
                "rows": rows,
            }))
        }
    }
}

const SVG_WIDTH: f64 = 800.0;
const SVG_HEIGHT: f64 = 600.0;
const SVG_PADDING: f64 = 40.0;

/// Render buses and lines as a minimal SVG topology view. Geographic
/// coordinates are fitted to the viewport; y grows upwards in the model and
/// downwards in SVG, so it is flipped.
pub(crate) fn render_topology_svg(model: &Value) -> Result<String, String> {
    let buses = parse_buses(model)?;
    if buses.is_empty() {
        return Err("model has no buses to render".to_string());
    }
    let lines = parse_lines(model).unwrap_or_default();
    let coords: HashMap<&str, (f64, f64)> = buses
        .iter()
        .map(|b| (b.id.as_str(), (b.x, b.y)))
        .collect();

    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for bus in &buses {
        min_x = min_x.min(bus.x);
        max_x = max_x.max(bus.x);
        min_y = min_y.min(bus.y);
        max_y = max_y.max(bus.y);
    }

    // Degenerate extents (single bus, collinear grid) still need a nonzero
    // scale.
    let span_x = (max_x - min_x).max(f64::EPSILON);
    let span_y = (max_y - min_y).max(f64::EPSILON);
    let scale_x = (SVG_WIDTH - 2.0 * SVG_PADDING) / span_x;
    let scale_y = (SVG_HEIGHT - 2.0 * SVG_PADDING) / span_y;

    let project = |x: f64, y: f64| -> (f64, f64) {
        (
            SVG_PADDING + (x - min_x) * scale_x,
            SVG_HEIGHT - SVG_PADDING - (y - min_y) * scale_y,
        )
    };

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {SVG_WIDTH} {SVG_HEIGHT}">"#
    );

    for line in &lines {
        let (Some(&(x0, y0)), Some(&(x1, y1))) = (
            coords.get(line.bus0.as_str()),
            coords.get(line.bus1.as_str()),
        ) else {
            return Err(format!("line {} references an unknown bus", line.id));
        };
        let (px0, py0) = project(x0, y0);
        let (px1, py1) = project(x1, y1);
        svg.push_str(&format!(
            r##"<line x1="{px0:.1}" y1="{py0:.1}" x2="{px1:.1}" y2="{py1:.1}" stroke="#5b8db8" stroke-width="1.5"/>"##
        ));
    }

    for bus in &buses {
        let (px, py) = project(bus.x, bus.y);
        svg.push_str(&format!(
            r##"<circle cx="{px:.1}" cy="{py:.1}" r="4" fill="#d9534f"><title>{}</title></circle>"##,
            bus.id
        ));
    }

    svg.push_str("</svg>");
    Ok(svg)
}
