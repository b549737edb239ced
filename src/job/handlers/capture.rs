//! Capture handlers: take three, sweep room, and the intruder capture used by
//! secure mode

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{error, info};

use crate::cues::Cue;
use crate::job::{JobContext, JobOutcome};
use crate::scripts;

const IMAGE_FILES: [&str; 3] = ["left.jpg", "center.jpg", "right.jpg"];
const VIDEO_FILE: &str = "sweepVideo.mpg";

/// Handle TAKE_THREE
pub async fn take_three(ctx: &JobContext, send_ack: bool) -> JobOutcome {
    ctx.cues.play(Cue::TakeThree);
    if send_ack {
        ctx.host.notify("Taking images, sending you links soon.").await;
    }

    match capture_images(ctx, "Take Three").await {
        Ok(link) => JobOutcome::Completed {
            message: format!("Please click the below link to view the images: {link}"),
        },
        Err(e) => {
            error!("[JOB] Take three failed: {:#}", e);
            JobOutcome::Failed {
                message: "Unable to take photos.".into(),
            }
        }
    }
}

/// Handle SWEEP_ROOM
pub async fn sweep_room(ctx: &JobContext, send_ack: bool) -> JobOutcome {
    ctx.cues.play(Cue::SweepRoom);
    if send_ack {
        ctx.host.notify("Recording started.").await;
    }

    match capture_video(ctx).await {
        Ok(link) => JobOutcome::Completed {
            message: format!("Click the following link to view the video: {link}"),
        },
        Err(e) => {
            error!("[JOB] Sweep room failed: {:#}", e);
            JobOutcome::Failed {
                message: "Unable to record video.".into(),
            }
        }
    }
}

/// Take left, center and right images and upload them as `album`,
/// returning a short link
pub async fn capture_images(ctx: &JobContext, album: &str) -> Result<String> {
    let store = ctx.store_dir.to_string_lossy();
    ctx.scripts
        .run(scripts::TAKE_THREE_PICS, &[store.as_ref()])
        .await?;

    let files: Vec<PathBuf> = IMAGE_FILES.iter().map(|f| ctx.store_dir.join(f)).collect();
    let url = ctx
        .artifacts
        .upload_images(&files, album)
        .await
        .context("image upload")?;
    let link = ctx.artifacts.shorten_url(&url).await.context("shorten url")?;

    info!("[JOB] Images uploaded to album {}", album);
    Ok(link)
}

async fn capture_video(ctx: &JobContext) -> Result<String> {
    let store = ctx.store_dir.to_string_lossy();
    ctx.scripts
        .run(scripts::TAKE_SWEEP_VIDEO, &[store.as_ref()])
        .await?;

    let url = ctx
        .artifacts
        .upload_video(&ctx.store_dir.join(VIDEO_FILE))
        .await
        .context("video upload")?;
    let link = ctx.artifacts.shorten_url(&url).await.context("shorten url")?;

    info!("[JOB] Sweep video uploaded");
    Ok(link)
}
