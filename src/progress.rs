/// Coarse milestones of one layout pass, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProgressStage {
    Prepare,
    Solve,
    PostProcess,
    Labels,
    Containers,
    Done,
}

impl ProgressStage {
    /// Percentage milestone for hosts that surface a progress bar.
    pub fn percent(self) -> u8 {
        match self {
            ProgressStage::Prepare => 10,
            ProgressStage::Solve => 45,
            ProgressStage::PostProcess => 65,
            ProgressStage::Labels => 85,
            ProgressStage::Containers => 95,
            ProgressStage::Done => 100,
        }
    }
}

pub trait ProgressSink {
    fn report(&mut self, stage: ProgressStage);
}

/// Sink for callers that do not surface progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&mut self, _stage: ProgressStage) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestones_increase() {
        let stages = [
            ProgressStage::Prepare,
            ProgressStage::Solve,
            ProgressStage::PostProcess,
            ProgressStage::Labels,
            ProgressStage::Containers,
            ProgressStage::Done,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].percent() < pair[1].percent());
        }
        assert_eq!(ProgressStage::Done.percent(), 100);
    }
}
