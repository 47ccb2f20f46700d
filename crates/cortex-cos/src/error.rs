use thiserror::Error;

#[derive(Error, Debug)]
pub enum CosError {
    #[error("bus error: {0}")]
    Bus(#[from] cortex_bus::BusError),
    #[error("registry error: {0}")]
    Registry(#[from] cortex_registries::RegistryError),
    #[error("reference code generation failed: {0}")]
    RefCode(#[from] cortex_refcode::RefCodeError),
    #[error("skill error: {0}")]
    Skill(#[from] cortex_skills::SkillError),
}
