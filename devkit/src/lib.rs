/*!
# CareLink DevKit - Doubles et utilitaires de test

Bibliothèque facilitant le test des nœuds CareLink avec:
- Transport MQTT simulé pour tests sans broker
- Horloge manuelle, lien réseau et capteurs scriptés
- Builders de messages conformes aux topics
- Harness montant un nœud complet
*/

pub mod builders;
pub mod fakes;
pub mod mock_transport;
pub mod test_utils;

pub use builders::CareLinkMessageBuilder;
pub use fakes::{FakeClock, FakeLink, Frame, RecordingDisplay, RecordingHaptic};
pub use mock_transport::{MockTransport, WireEvent};
pub use test_utils::{profiles, NodeHarness};
