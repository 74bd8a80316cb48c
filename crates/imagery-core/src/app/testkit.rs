//! Shared fixtures for app-level tests: in-memory adapters wired together.

use std::io::Cursor;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

use crate::app::{IntakeService, OrphanRecovery, QueryService, TaskProcessor};
use crate::domain::RetryStrategy;
use crate::impls::{ImageTransformer, InMemoryBlobStore, InMemoryTaskQueue, InMemoryTaskStore};
use crate::ports::{ManualClock, UlidGenerator};

pub fn jpeg_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 40, 40])));
    encode(&img, ImageFormat::Jpeg)
}

pub fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 200])));
    encode(&img, ImageFormat::Png)
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub tasks: Arc<InMemoryTaskStore>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub queue: Arc<InMemoryTaskQueue>,
    pub intake: IntakeService,
    pub processor: Arc<TaskProcessor>,
    pub query: QueryService,
    pub recovery: OrphanRecovery,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let tasks = Arc::new(InMemoryTaskStore::new(clock.clone()));
        let blobs = Arc::new(InMemoryBlobStore::new());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let retry = RetryStrategy::immediate(3);

        let intake = IntakeService::new(
            tasks.clone(),
            blobs.clone(),
            queue.clone(),
            Arc::new(UlidGenerator::new(clock.clone())),
            clock.clone(),
        )
        .with_retry(retry.clone());
        let processor = Arc::new(TaskProcessor::new(
            tasks.clone(),
            blobs.clone(),
            Arc::new(ImageTransformer::new()),
            clock.clone(),
        ));
        let query = QueryService::new(tasks.clone(), blobs.clone());
        let recovery =
            OrphanRecovery::new(tasks.clone(), queue.clone(), clock.clone()).with_retry(retry);

        Self {
            clock,
            tasks,
            blobs,
            queue,
            intake,
            processor,
            query,
            recovery,
        }
    }
}
