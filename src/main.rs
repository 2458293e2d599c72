//! Binary entrypoint: trains a model on a fixed synthetic sequence and saves it.
//!
//! Settings come from `MICROGPT_STACK_*` environment variables; log verbosity
//! from `RUST_LOG` (default `info`).

use microgpt_stack::{config, train, Error, Model, Module};
use rand::{rngs::StdRng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = config::from_env()?;
    cfg.validate()?;
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let mut model = Model::new(cfg.dims(), cfg.init_scale, &mut rng)?;
    info!(dims = %model.dims(), num_params = model.num_params(), "model initialized");

    // Stand-in for tokenized text: a fixed walk over the vocabulary.
    let ids: Vec<usize> = (0..cfg.seq_len).map(|i| (i * 7 + 3) % cfg.vocab_size).collect();
    let targets = train::next_token_targets(&ids, cfg.vocab_size);

    let losses = train::fit(&mut model, &ids, &targets, &cfg.train_config());
    if let (Some(first), Some(last)) = (losses.first(), losses.last()) {
        info!(first, last, "training finished");
    }

    model.save(&cfg.checkpoint_path)?;
    info!(path = %cfg.checkpoint_path.display(), "checkpoint saved");

    let greedy = model.predict_next(&ids);
    let sampled = model.sample_next(&ids, cfg.temperature, &mut rng);
    info!(greedy, sampled, "next token after the training sequence");
    Ok(())
}
