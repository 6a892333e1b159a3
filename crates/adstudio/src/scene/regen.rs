//! The generate → QC → regenerate loop shared by the storyboard and video
//! stages.

use async_trait::async_trait;

use crate::pipeline::PipelineError;

/// One scene's generation round. Implementations bundle generation and QC
/// so a candidate always arrives already judged.
#[async_trait]
pub trait CandidateRound: Send + Sync {
    type Candidate: Send + Sync;

    /// `attempt` is 0 for the initial generation.
    async fn generate(&self, prompt: &str, attempt: u32)
        -> Result<Self::Candidate, PipelineError>;

    fn passes(&self, candidate: &Self::Candidate) -> bool;

    /// Strictly better than the current best.
    fn better(&self, candidate: &Self::Candidate, best: &Self::Candidate) -> bool;

    /// QC-feedback rewrite of `prompt` based on `latest`.
    async fn rewrite(
        &self,
        prompt: &str,
        latest: &Self::Candidate,
        attempt: u32,
    ) -> Result<String, PipelineError>;
}

#[derive(Debug)]
pub struct RegenOutcome<C> {
    pub best: C,
    /// Prompt that produced `best`.
    pub prompt_used: String,
    pub regen_attempts: u32,
    pub passed: bool,
    pub generations: u32,
}

/// Runs at most `max_regen + 1` generations and keeps the best candidate
/// seen. Exhausting the budget without a pass is not an error.
pub async fn run_regen_loop<R>(
    round: &R,
    initial_prompt: String,
    max_regen: u32,
    on_regen: &(dyn Fn(u32) + Send + Sync),
) -> Result<RegenOutcome<R::Candidate>, PipelineError>
where
    R: CandidateRound + ?Sized,
{
    let mut prompt = initial_prompt;
    let mut best = round.generate(&prompt, 0).await?;
    let mut best_prompt = prompt.clone();
    // Most recent candidate when it did not replace `best`.
    let mut latest: Option<R::Candidate> = None;
    let mut regen_attempts = 0;

    loop {
        if round.passes(&best) {
            break;
        }
        if regen_attempts >= max_regen {
            break;
        }

        regen_attempts += 1;
        prompt = round
            .rewrite(&prompt, latest.as_ref().unwrap_or(&best), regen_attempts)
            .await?;
        on_regen(regen_attempts);

        let candidate = round.generate(&prompt, regen_attempts).await?;
        if round.better(&candidate, &best) {
            best = candidate;
            best_prompt = prompt.clone();
            latest = None;
        } else {
            latest = Some(candidate);
        }
    }

    Ok(RegenOutcome {
        passed: round.passes(&best),
        best,
        prompt_used: best_prompt,
        regen_attempts,
        generations: regen_attempts + 1,
    })
}
