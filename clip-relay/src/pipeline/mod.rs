//! Job queue and the resolve → acquire → normalize → publish pipeline.

mod acquire;
mod consumer;
mod job_queue;
mod normalize;
mod publish;
mod workspace;

pub use acquire::{Acquirer, Aria2Transport, Transport};
pub use consumer::{Consumer, JobOutcome, PipelineStages};
pub use job_queue::{JobReceiver, JobSender, job_queue};
pub use normalize::{
    FfmpegTool, MediaTool, NormalizeOutcome, Normalizer, concat_list, repeat_count,
};
pub use publish::{PublishSurface, Publisher};
pub use workspace::{JobWorkspace, artifact_path};
