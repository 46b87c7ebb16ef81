use super::BUILD_PROVENANCE_PREDICATE_TYPE_V02;
use super::statement::{
    Builder, Command, Environment, Invocation, ProvenancePredicate, ProvenanceStatement,
    WorkingDir,
};
use crate::hash::ArtifactDigest;
use crate::in_toto::{Statement, make_subject};

pub const BUILDER_ID: &str = "https://github.com/keyless-provenance/keyless-provenance/builders/go@v1";
pub const BUILD_TYPE: &str = "https://github.com/keyless-provenance/keyless-provenance/build-types/go@v1";

pub fn make_builder_v02(id: &str) -> Builder {
    Builder { id: id.to_string() }
}

pub fn make_invocation_v02(
    command: Command,
    environment: Environment,
    working_dir: WorkingDir,
) -> Invocation {
    Invocation {
        command,
        environment,
        working_dir,
    }
}

pub fn make_predicate_v02(builder: Builder, invocation: Invocation) -> ProvenancePredicate {
    ProvenancePredicate {
        builder,
        build_type: BUILD_TYPE.to_string(),
        invocation,
    }
}

/// Build the provenance statement for one artifact.
///
/// The three invocation fields are copied verbatim; nothing is parsed,
/// normalized or sanitized.
pub fn generate_provenance_v02(
    subject_name: &str,
    digest: &ArtifactDigest,
    command: Command,
    environment: Environment,
    working_dir: WorkingDir,
) -> ProvenanceStatement {
    let predicate = make_predicate_v02(
        make_builder_v02(BUILDER_ID),
        make_invocation_v02(command, environment, working_dir),
    );
    let statement = Statement::new_v01(
        vec![make_subject(subject_name, digest)],
        BUILD_PROVENANCE_PREDICATE_TYPE_V02,
        predicate,
    );

    ProvenanceStatement::new(statement, digest.clone())
}
