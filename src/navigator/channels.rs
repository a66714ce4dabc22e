//! Channels shared by the shell and its collaborators

use crate::navigator::bus::Channel;
use crate::navigator::imperative::ObjectUuid;
use crate::navigator::window::WindowKey;

/// An imperative object mutated itself and wants its subscribers to re-render
pub struct ImperativeUpdate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImperativeUpdatePayload {
    pub object_uuid: ObjectUuid,
}

impl Channel for ImperativeUpdate {
    const NAME: &'static str = "imperativeUpdate";
    type Payload = ImperativeUpdatePayload;
}

/// The window stack changed; outlets should re-render
pub struct WindowsChanged;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowsChangedPayload {
    pub depth: usize,
    pub top: Option<WindowKey>,
}

impl Channel for WindowsChanged {
    const NAME: &'static str = "windowsChanged";
    type Payload = WindowsChangedPayload;
}

/// The set of visible toasts changed
pub struct ToastsChanged;

impl Channel for ToastsChanged {
    const NAME: &'static str = "toastsChanged";
    type Payload = usize;
}

/// A back signal arrived with no window left to handle it
pub struct ExitRequested;

impl Channel for ExitRequested {
    const NAME: &'static str = "exitRequested";
    type Payload = ();
}

/// One five-channel sample streamed by the sensor device
pub struct BluetoothSensorData;

impl Channel for BluetoothSensorData {
    const NAME: &'static str = "bluetoothSensorData";
    type Payload = [u32; 5];
}

/// A training run finished
pub struct TrainingComplete;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingCompletePayload {
    pub estimator: String,
    pub accuracy: Option<f64>,
}

impl Channel for TrainingComplete {
    const NAME: &'static str = "trainingComplete";
    type Payload = TrainingCompletePayload;
}
