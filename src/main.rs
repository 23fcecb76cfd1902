mod telemetry;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use grip::mirrors::Element;
use grip::{ClassMirror, FieldMirror, FileRegistry, Grip, GripFactory, MethodMirror, ObjectType};
use opentelemetry::KeyValue;
use serde::Serialize;
use tracing::info;

use crate::telemetry::{Telemetry, add_current_span_event, current_trace_id, init_logging, with_span};

/// CLI arguments for grip execution.
#[derive(Parser, Debug)]
#[command(
    name = "grip",
    about = "Inspect classes, fields and methods of JVM class files and jars.",
    version
)]
struct Cli {
    #[arg(long, value_name = "PATH", required = true)]
    classpath: Vec<PathBuf>,
    /// Keep classes whose binary name contains this text.
    #[arg(long, value_name = "TEXT")]
    filter: Option<String>,
    /// Keep classes annotated with this type, e.g. `com.example.Entity`.
    #[arg(long, value_name = "TYPE")]
    annotation: Option<String>,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
    /// OTLP HTTP endpoint for tracing, e.g. `http://localhost:4318/`.
    #[arg(long, value_name = "URL")]
    otel: Option<String>,
}

#[derive(Serialize)]
struct Report {
    classpath: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
    classes: Vec<ClassReport>,
}

#[derive(Serialize)]
struct ClassReport {
    name: String,
    internal_name: String,
    simple_name: String,
    version: u32,
    access: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    super_type: Option<String>,
    interfaces: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    annotations: Vec<String>,
    fields: Vec<FieldReport>,
    constructors: Vec<MethodReport>,
    methods: Vec<MethodReport>,
}

#[derive(Serialize)]
struct FieldReport {
    name: String,
    access: u16,
    descriptor: String,
    generic_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    annotations: Vec<String>,
}

#[derive(Serialize)]
struct MethodReport {
    name: String,
    access: u16,
    descriptor: String,
    exceptions: Vec<String>,
    annotations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_value: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet);
    let telemetry = match cli.otel.clone() {
        Some(endpoint) => Some(Telemetry::new(endpoint)?),
        None => None,
    };
    let result = with_span(telemetry.as_ref(), "grip.run", &[], || run(&cli, telemetry.as_ref()));
    if let Some(telemetry) = telemetry {
        telemetry.shutdown()?;
    }
    result
}

fn run(cli: &Cli, telemetry: Option<&Telemetry>) -> Result<()> {
    for entry in &cli.classpath {
        if !entry.exists() {
            anyhow::bail!("classpath entry not found: {}", entry.display());
        }
    }

    let started_at = Instant::now();
    let grip = GripFactory::default().create(&cli.classpath, None)?;
    let annotation = cli.annotation.as_deref().map(annotation_type);
    let classes = with_span(
        telemetry,
        "grip.select",
        &[KeyValue::new("grip.classpath_entries", cli.classpath.len() as i64)],
        || select(&grip, cli.filter.as_deref(), annotation.as_ref()),
    )?;
    let select_duration_ms = started_at.elapsed().as_millis();

    let report = with_span(telemetry, "grip.report", &[], || {
        build_report(&grip, &classes)
    })?;
    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &report).context("failed to serialize report")?;
    writer.write_all(b"\n").context("failed to write report")?;
    grip.close();

    info!(classes = classes.len(), "inspection finished");
    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} select_ms={} classes={}",
            started_at.elapsed().as_millis(),
            select_duration_ms,
            classes.len()
        );
    }
    Ok(())
}

fn select(
    grip: &Grip,
    filter: Option<&str>,
    annotation: Option<&ObjectType>,
) -> Result<Vec<Rc<ClassMirror>>> {
    let source = grip.classpath()?;
    let selected = grip.select_classes(&source, |_, mirror| {
        if let Some(filter) = filter {
            if !mirror.name()?.contains(filter) {
                return Ok(false);
            }
        }
        if let Some(annotation) = annotation {
            if !mirror.annotations()?.contains(annotation) {
                return Ok(false);
            }
        }
        add_current_span_event(
            "grip.class",
            &[KeyValue::new("grip.type", mirror.ty().to_string())],
        );
        Ok(true)
    })?;
    Ok(selected.into_values().collect())
}

/// Internal name for a dotted or slash-separated class name.
fn annotation_type(name: &str) -> ObjectType {
    ObjectType::new(name.replace('.', "/"))
}

fn build_report(grip: &Grip, classes: &[Rc<ClassMirror>]) -> Result<Report> {
    let classpath = grip
        .file_registry()?
        .classpath()?
        .iter()
        .map(|file| file.display().to_string())
        .collect();
    let classes = classes
        .iter()
        .map(|mirror| class_report(mirror))
        .collect::<Result<Vec<_>>>()?;
    Ok(Report {
        classpath,
        trace_id: current_trace_id(),
        classes,
    })
}

fn class_report(mirror: &ClassMirror) -> Result<ClassReport> {
    Ok(ClassReport {
        name: mirror.name()?.to_string(),
        internal_name: mirror.ty().internal_name().to_string(),
        simple_name: mirror.simple_name()?.to_string(),
        version: mirror.version(),
        access: mirror.access(),
        super_type: mirror.super_type().map(ToString::to_string),
        interfaces: mirror.interfaces().iter().map(ToString::to_string).collect(),
        source: mirror.source()?.map(str::to_string),
        annotations: mirror
            .annotations()?
            .iter()
            .map(ToString::to_string)
            .collect(),
        fields: mirror
            .fields()?
            .iter()
            .map(field_report)
            .collect::<Result<Vec<_>>>()?,
        constructors: mirror.constructors()?.iter().map(method_report).collect(),
        methods: mirror.methods()?.iter().map(method_report).collect(),
    })
}

fn field_report(field: &FieldMirror) -> Result<FieldReport> {
    Ok(FieldReport {
        name: field.name().to_string(),
        access: field.access(),
        descriptor: field.ty().descriptor(),
        generic_type: field.generic_type()?.to_string(),
        value: field.value().map(ToString::to_string),
        annotations: field.annotations().iter().map(ToString::to_string).collect(),
    })
}

fn method_report(method: &MethodMirror) -> MethodReport {
    MethodReport {
        name: method.name().to_string(),
        access: method.access(),
        descriptor: method.ty().descriptor(),
        exceptions: method.exceptions().iter().map(ToString::to_string).collect(),
        annotations: method
            .annotations()
            .iter()
            .map(ToString::to_string)
            .collect(),
        default_value: method.default_value().map(ToString::to_string),
    }
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}
