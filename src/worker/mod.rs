pub mod extractor;
pub mod protocol;
pub mod runtime;

pub use extractor::{FrameExtractor, UnsupportedExtractor};
pub use protocol::{
    CalculateTransitions, DecodedFrame, ExtractFrames, PreloadClip, Progress, RequestBody,
    RequestId, ResponseBody, WorkerOutput, WorkerRequest, WorkerResponse,
};
pub use runtime::PreprocessWorker;
